//! Concurrent fan-out over all configured venues and best-quote selection

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::shared::types::{Address, AddressExt};

use super::gas_oracle::GasPriceCache;
use super::scoring::select_best;
use super::{AggregatorConfig, BestQuote, Quote, QuoteRequest, VenueQuoteClient};

/// A venue adapter with its own request timeout
#[derive(Clone)]
pub struct VenueHandle {
    pub client: Arc<dyn VenueQuoteClient>,
    pub timeout: Duration,
}

pub struct QuoteAggregator {
    venues: Vec<VenueHandle>,
    gas: Arc<GasPriceCache>,
    config: AggregatorConfig,
}

impl QuoteAggregator {
    pub fn new(venues: Vec<VenueHandle>, gas: Arc<GasPriceCache>, config: AggregatorConfig) -> Self {
        Self { venues, gas, config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn venue_count(&self) -> usize {
        self.venues.len()
    }

    /// Current buffered gas price, shared with execution
    pub async fn gas_price(&self) -> u128 {
        self.gas.get().await
    }

    /// One quote per venue. A failed or timed-out venue yields an unavailable quote.
    pub async fn collect_quotes(&self, request: &QuoteRequest) -> Vec<Quote> {
        let calls = self.venues.iter().map(|venue| async move {
            let client = &venue.client;
            match tokio::time::timeout(venue.timeout, client.quote(request)).await {
                Ok(Ok(quote)) => quote,
                Ok(Err(e)) => {
                    debug!("🔍 {} quote failed: {}", client.name(), e);
                    Quote::unavailable(client.name(), client.kind(), client.router(), e.to_string())
                }
                Err(_) => {
                    debug!("⏱️ {} quote timed out after {:?}", client.name(), venue.timeout);
                    Quote::unavailable(client.name(), client.kind(), client.router(), "timeout")
                }
            }
        });
        join_all(calls).await
    }

    /// Best quote across venues, `None` when no venue is usable
    pub async fn best_quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: u128,
        is_buy: bool,
    ) -> Option<BestQuote> {
        let request = QuoteRequest {
            token_in,
            token_out,
            amount_in,
            is_buy,
        };
        let quotes = self.collect_quotes(&request).await;
        let gas_price = self.gas.get().await;

        match select_best(&quotes, gas_price, &self.config) {
            Some(best) => {
                info!(
                    "📊 Best quote: {} out={} impact={:.2}% score={:.4}",
                    best.quote.venue,
                    best.quote.amount_out,
                    best.quote.price_impact * 100.0,
                    best.efficiency_score
                );
                Some(best)
            }
            None => {
                let available = quotes.iter().filter(|q| q.available).count();
                warn!(
                    "❌ No usable quote for {} -> {} ({} of {} venues answered)",
                    token_in.short(),
                    token_out.short(),
                    available,
                    quotes.len()
                );
                None
            }
        }
    }
}
