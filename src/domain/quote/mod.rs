//! Quote domain - venue quotes, scoring and best-quote aggregation

pub mod aggregator;
pub mod gas_oracle;
pub mod scoring;

pub use aggregator::{QuoteAggregator, VenueHandle};
pub use gas_oracle::GasPriceCache;
pub use scoring::{is_eligible, score_quote, select_best};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared::errors::TradeError;
use crate::shared::types::Address;

/// Pool model behind a venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VenueKind {
    #[serde(rename = "v2")]
    ConstantProduct,
    #[serde(rename = "v3")]
    ConcentratedLiquidity,
}

impl VenueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueKind::ConstantProduct => "v2",
            VenueKind::ConcentratedLiquidity => "v3",
        }
    }
}

impl fmt::Display for VenueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single venue's answer to a quote request. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub venue: String,
    pub kind: VenueKind,
    pub router: Address,
    /// Raw output amount in the output token's smallest unit
    pub amount_out: u128,
    /// Fractional price impact, 0..1
    pub price_impact: f64,
    pub gas_estimate: u64,
    /// Modeled slippage fraction, 0..1
    pub slippage: f64,
    /// Pool depth in base-asset units
    pub liquidity: f64,
    pub available: bool,
    /// Concentrated-liquidity pool fee in hundredths of a bip
    pub fee_tier: Option<u32>,
    pub error: Option<String>,
}

impl Quote {
    /// Placeholder for a venue that failed or had no pool
    pub fn unavailable(venue: &str, kind: VenueKind, router: Address, error: impl Into<String>) -> Self {
        Self {
            venue: venue.to_string(),
            kind,
            router,
            amount_out: 0,
            price_impact: 1.0,
            gas_estimate: 0,
            slippage: 0.0,
            liquidity: 0.0,
            available: false,
            fee_tier: None,
            error: Some(error.into()),
        }
    }
}

/// Winning quote plus the figures it was ranked on
#[derive(Debug, Clone, PartialEq)]
pub struct BestQuote {
    pub quote: Quote,
    pub net_amount: u128,
    pub slippage_cost: u128,
    pub gas_cost: u128,
    pub total_cost: u128,
    pub efficiency_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: u128,
    pub is_buy: bool,
}

/// Per-venue quote adapter (constant-product router, concentrated-liquidity quoter, ...)
#[async_trait]
pub trait VenueQuoteClient: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> VenueKind;

    fn router(&self) -> Address;

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, TradeError>;
}

/// Filtering and gas-cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub max_price_impact: f64,
    /// Minimum pool depth in base-asset units
    pub min_liquidity: f64,
    /// Cap applied by venues to their modeled slippage
    pub max_slippage: f64,
    pub gas_cache_ttl_secs: u64,
    pub congestion_buffer: f64,
    pub fallback_gas_price_gwei: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_price_impact: 0.15,
            min_liquidity: 0.1,
            max_slippage: 0.15,
            gas_cache_ttl_secs: 30,
            congestion_buffer: 0.10,
            fallback_gas_price_gwei: 20.0,
        }
    }
}
