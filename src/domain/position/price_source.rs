//! Mark prices for open positions

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::quote::QuoteAggregator;
use crate::shared::errors::TradeError;
use crate::shared::types::Address;
use crate::shared::utils::wei_to_eth;

/// Current price of one whole token in base units
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price(&self, token: Address, decimals: u8) -> Result<f64, TradeError>;
}

/// Prices a token by its best sell quote into WETH
pub struct AggregatorPriceSource {
    aggregator: Arc<QuoteAggregator>,
    weth: Address,
}

impl AggregatorPriceSource {
    pub fn new(aggregator: Arc<QuoteAggregator>, weth: Address) -> Self {
        Self { aggregator, weth }
    }
}

#[async_trait]
impl PriceSource for AggregatorPriceSource {
    async fn price(&self, token: Address, decimals: u8) -> Result<f64, TradeError> {
        let one = 10u128
            .checked_pow(decimals as u32)
            .ok_or_else(|| TradeError::Abi(format!("unsupported decimals {}", decimals)))?;

        let best = self
            .aggregator
            .best_quote(token, self.weth, one, false)
            .await
            .ok_or(TradeError::QuoteUnavailable)?;

        Ok(wei_to_eth(best.quote.amount_out))
    }
}
