//! Portfolio domain - entry sizing and profit reinvestment

pub mod rebalancer;
pub mod sizing;

pub use rebalancer::PortfolioRebalancer;
pub use sizing::PositionSizer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Anything that accumulates realized profit in base units
#[async_trait]
pub trait RealizedProfitSource: Send + Sync {
    async fn realized_profit(&self) -> f64;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalancerConfig {
    pub interval_secs: u64,
    /// Share of new profit turned into larger entries
    pub reinvest_fraction: f64,
    /// Reinvestments below this amount are skipped and carried over
    pub min_reinvest: f64,
    /// Number of future trades the reinvested amount is spread across
    pub spread_trades: u32,
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 86_400,
            reinvest_fraction: 0.5,
            min_reinvest: 0.01,
            spread_trades: 10,
        }
    }
}
