//! Entry sizing per strategy

use tokio::sync::RwLock;
use tracing::info;

use crate::domain::position::{PositionConfig, Strategy};

pub struct PositionSizer {
    trade_size: RwLock<f64>,
    config: PositionConfig,
}

impl PositionSizer {
    pub fn new(config: PositionConfig) -> Self {
        Self {
            trade_size: RwLock::new(config.trade_size),
            config,
        }
    }

    pub async fn trade_size(&self) -> f64 {
        *self.trade_size.read().await
    }

    /// Entry size in base units
    pub async fn size_for(&self, strategy: Strategy) -> f64 {
        let base = self.trade_size().await;
        match strategy {
            Strategy::Memecoin => base.min(self.config.memecoin.max_investment),
            Strategy::Altcoin => base * self.config.altcoin.size_multiplier,
        }
    }

    /// Grow the base trade size, returns the new value
    pub async fn increase(&self, delta: f64) -> f64 {
        let mut size = self.trade_size.write().await;
        if delta > 0.0 && delta.is_finite() {
            *size += delta;
            info!("📐 Trade size raised by {:.6} to {:.6} ETH", delta, *size);
        }
        *size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_strategy_sizing() {
        let sizer = PositionSizer::new(PositionConfig::default());
        assert!((sizer.size_for(Strategy::Memecoin).await - 0.001).abs() < 1e-12);
        assert!((sizer.size_for(Strategy::Altcoin).await - 0.002).abs() < 1e-12);

        sizer.increase(0.01).await;
        // memecoin entries stay under their cap
        assert!((sizer.size_for(Strategy::Memecoin).await - 0.008).abs() < 1e-12);
        assert!((sizer.size_for(Strategy::Altcoin).await - 0.022).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_increase_ignores_non_positive() {
        let sizer = PositionSizer::new(PositionConfig::default());
        assert_eq!(sizer.increase(-1.0).await, 0.001);
        assert_eq!(sizer.increase(f64::NAN).await, 0.001);
    }
}
