//! Periodic reinvestment of realized profit into entry size

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::external::{notify, NotificationSink};

use super::{PositionSizer, RealizedProfitSource, RebalancerConfig};

pub struct PortfolioRebalancer {
    profit: Arc<dyn RealizedProfitSource>,
    sizer: Arc<PositionSizer>,
    notifier: Arc<dyn NotificationSink>,
    config: RebalancerConfig,
    /// Profit already reinvested, never counted twice
    accounted: Mutex<f64>,
}

impl PortfolioRebalancer {
    pub fn new(
        profit: Arc<dyn RealizedProfitSource>,
        sizer: Arc<PositionSizer>,
        notifier: Arc<dyn NotificationSink>,
        config: RebalancerConfig,
    ) -> Self {
        Self {
            profit,
            sizer,
            notifier,
            config,
            accounted: Mutex::new(0.0),
        }
    }

    pub fn config(&self) -> &RebalancerConfig {
        &self.config
    }

    /// Reinvest a share of profit realized since the last reinvestment.
    ///
    /// Returns the reinvested amount, `None` when below the minimum.
    pub async fn rebalance(&self) -> Option<f64> {
        let realized = self.profit.realized_profit().await;
        let mut accounted = self.accounted.lock().await;

        let fresh = realized - *accounted;
        if fresh <= 0.0 {
            debug!("📉 No new profit to reinvest ({:.6} ETH realized)", realized);
            return None;
        }

        let reinvest = fresh * self.config.reinvest_fraction;
        if reinvest <= self.config.min_reinvest {
            debug!(
                "📉 Reinvestable {:.6} ETH below minimum {:.6} ETH",
                reinvest, self.config.min_reinvest
            );
            return None;
        }

        *accounted = realized;
        let spread = self.config.spread_trades.max(1) as f64;
        let size = self.sizer.increase(reinvest / spread).await;
        drop(accounted);

        info!("📈 Portfolio rebalanced: +{:.4} ETH reinvested, trade size {:.6} ETH", reinvest, size);
        notify(
            self.notifier.as_ref(),
            &format!("📈 Rebalance: +{:.4} ETH reinvested, trade size now {:.6} ETH", reinvest, size),
        )
        .await;
        Some(reinvest)
    }
}
