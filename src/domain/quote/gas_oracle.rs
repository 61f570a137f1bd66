//! Short-lived gas price cache with a congestion buffer

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::chain::ChainClient;
use crate::shared::utils::gwei_to_wei;

use super::AggregatorConfig;

pub struct GasPriceCache {
    client: Arc<dyn ChainClient>,
    ttl: Duration,
    buffer: f64,
    fallback: u128,
    cached: Mutex<Option<(u128, Instant)>>,
}

impl GasPriceCache {
    pub fn new(client: Arc<dyn ChainClient>, config: &AggregatorConfig) -> Self {
        Self {
            client,
            ttl: Duration::from_secs(config.gas_cache_ttl_secs),
            buffer: config.congestion_buffer,
            fallback: gwei_to_wei(config.fallback_gas_price_gwei),
            cached: Mutex::new(None),
        }
    }

    /// Buffered gas price in wei.
    ///
    /// A failed refresh serves the last good value if there is one, otherwise the fallback.
    pub async fn get(&self) -> u128 {
        let mut cached = self.cached.lock().await;
        if let Some((price, fetched_at)) = *cached {
            if fetched_at.elapsed() < self.ttl {
                return price;
            }
        }

        match self.client.gas_price().await {
            Ok(network) => {
                let buffered = (network as f64 * (1.0 + self.buffer)) as u128;
                debug!("⛽ Gas price refreshed: {} wei (network {})", buffered, network);
                *cached = Some((buffered, Instant::now()));
                buffered
            }
            Err(e) => match *cached {
                Some((price, _)) => {
                    warn!("⚠️ Gas price refresh failed, keeping last value: {}", e);
                    price
                }
                None => {
                    warn!("⚠️ Gas price unavailable, using fallback {} wei: {}", self.fallback, e);
                    self.fallback
                }
            },
        }
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
