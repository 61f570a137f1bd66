//! Per-signer nonce sequencing with a short-lived cache

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::chain::ChainClient;
use crate::shared::errors::TradeError;
use crate::shared::types::{Address, AddressExt};

use super::retry::{retry_async, RetryPolicy};

struct CachedNonce {
    next: u64,
    fetched_at: Instant,
}

/// Hands out nonces for one signer, one at a time.
///
/// The pending count is re-read from the node when the cache is older than
/// `ttl` or after `invalidate`; in between nonces are incremented locally.
pub struct NonceManager {
    chain: Arc<dyn ChainClient>,
    address: Address,
    ttl: Duration,
    cache: Mutex<Option<CachedNonce>>,
}

impl NonceManager {
    pub fn new(chain: Arc<dyn ChainClient>, address: Address, ttl: Duration) -> Self {
        Self {
            chain,
            address,
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Reserve the next nonce
    pub async fn next(&self) -> Result<u64, TradeError> {
        let mut cache = self.cache.lock().await;

        let stale = cache
            .as_ref()
            .map(|c| c.fetched_at.elapsed() >= self.ttl)
            .unwrap_or(true);

        if stale {
            let on_chain = self.fetch().await?;
            // keep locally issued nonces the node has not seen yet
            let next = match cache.as_ref() {
                Some(c) if c.next > on_chain => c.next,
                _ => on_chain,
            };
            debug!("🔢 Nonce resynced for {}: {}", self.address.short(), next);
            *cache = Some(CachedNonce {
                next,
                fetched_at: Instant::now(),
            });
        }

        match cache.as_mut() {
            Some(c) => {
                let nonce = c.next;
                c.next += 1;
                Ok(nonce)
            }
            None => Err(TradeError::TransientNetworkError("nonce cache empty".to_string())),
        }
    }

    /// Drop the cache so the next call re-reads the node, e.g. after a failed broadcast
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    async fn fetch(&self) -> Result<u64, TradeError> {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(100), Duration::from_secs(1));
        let chain = self.chain.clone();
        let address = self.address;
        retry_async(&policy, |e: &TradeError| e.is_retryable(), move |_| {
            let chain = chain.clone();
            async move { chain.nonce(address).await.map_err(TradeError::from) }
        })
        .await
    }
}
