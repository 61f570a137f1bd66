//! Background loops: position ticks and periodic rebalancing

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::domain::portfolio::PortfolioRebalancer;
use crate::domain::position::PositionLedger;

/// Sender side of the shutdown signal; `true` means stop
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Drive `ledger.tick()` every `period` until shutdown.
///
/// The signal is only observed between ticks, so an exit already being
/// submitted runs to completion.
pub fn spawn_position_monitor(
    ledger: Arc<PositionLedger>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("👀 Position monitor started ({}s tick)", period.as_secs_f64());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if ledger.is_empty().await {
                        continue;
                    }
                    let report = ledger.tick().await;
                    debug!("⏱️ Tick: {:?}", report);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("🛑 Position monitor stopped");
    })
}

/// Run the rebalancer every `period` until shutdown; the first run is one period in
pub fn spawn_rebalancer(
    rebalancer: Arc<PortfolioRebalancer>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval fires immediately once
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(amount) = rebalancer.rebalance().await {
                        debug!("♻️ Rebalanced {:.6} ETH", amount);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("🛑 Rebalancer stopped");
    })
}
