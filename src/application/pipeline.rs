//! Entry pipeline: candidate token in, open position (or a reason) out

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::execution::{SafeTradeExecutor, TradeRequest};
use crate::domain::external::{notify, NotificationSink, SecurityChecker, TokenMetadataProvider};
use crate::domain::portfolio::PositionSizer;
use crate::domain::position::{Position, PositionLedger, Strategy};
use crate::shared::errors::TradeError;
use crate::shared::types::{Address, AddressExt};
use crate::shared::utils::eth_to_wei;

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Opened(Position),
    AlreadyProcessed,
    AtCapacity,
    Unsafe,
    Blocked(String),
    Failed(String),
}

impl fmt::Display for EntryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryOutcome::Opened(p) => write!(f, "opened {} @ {:.10} ETH", p.symbol, p.entry_price),
            EntryOutcome::AlreadyProcessed => f.write_str("already processed"),
            EntryOutcome::AtCapacity => f.write_str("position limit reached"),
            EntryOutcome::Unsafe => f.write_str("failed security screen"),
            EntryOutcome::Blocked(reason) => write!(f, "blocked: {}", reason),
            EntryOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

pub struct EntryPipeline {
    ledger: Arc<PositionLedger>,
    executor: Arc<SafeTradeExecutor>,
    sizer: Arc<PositionSizer>,
    metadata: Arc<dyn TokenMetadataProvider>,
    security: Arc<dyn SecurityChecker>,
    notifier: Arc<dyn NotificationSink>,
    weth: Address,
    processed: Mutex<HashSet<Address>>,
}

impl EntryPipeline {
    pub fn new(
        ledger: Arc<PositionLedger>,
        executor: Arc<SafeTradeExecutor>,
        sizer: Arc<PositionSizer>,
        metadata: Arc<dyn TokenMetadataProvider>,
        security: Arc<dyn SecurityChecker>,
        notifier: Arc<dyn NotificationSink>,
        weth: Address,
    ) -> Self {
        Self {
            ledger,
            executor,
            sizer,
            metadata,
            security,
            notifier,
            weth,
            processed: Mutex::new(HashSet::new()),
        }
    }

    /// Screen, size and buy one candidate token.
    ///
    /// A token is attempted at most once per process; a candidate turned away
    /// only because the book is full may be offered again later. The entry
    /// slot is held until the position is opened and freed on any other outcome.
    pub async fn handle_candidate(&self, token: Address, strategy: Strategy) -> EntryOutcome {
        if self.ledger.contains(token).await || self.processed.lock().await.contains(&token) {
            return EntryOutcome::AlreadyProcessed;
        }
        let Some(_slot) = self.ledger.reserve_slot().await else {
            info!("⏸️ Skipping {}: {} positions open", token.short(), self.ledger.len().await);
            return EntryOutcome::AtCapacity;
        };
        if !self.processed.lock().await.insert(token) {
            return EntryOutcome::AlreadyProcessed;
        }

        match self.security.is_safe(token).await {
            Ok(true) => {}
            Ok(false) => return EntryOutcome::Unsafe,
            Err(e) => {
                warn!("⚠️ Security check failed for {}: {}", token.short(), e);
                return EntryOutcome::Unsafe;
            }
        }

        let info = match self.metadata.info(token).await {
            Ok(info) => info,
            Err(e) => {
                error!("❌ No metadata for {}: {}", token.short(), e);
                return EntryOutcome::Failed(e.to_string());
            }
        };

        let size = self.sizer.size_for(strategy).await;
        let request = TradeRequest::buy(self.weth, token, eth_to_wei(size));
        info!("🎯 Buying {} ({}) for {:.6} ETH as {}", info.symbol, token.short(), size, strategy);

        let result = match self.executor.execute(&request, size).await {
            Ok(result) => result,
            Err(TradeError::RiskBlocked(reason)) => {
                warn!("🛑 Buy of {} blocked: {}", info.symbol, reason);
                return EntryOutcome::Blocked(reason);
            }
            Err(e) => return EntryOutcome::Failed(e.to_string()),
        };

        if !result.success {
            let reason = result
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            notify(self.notifier.as_ref(), &format!("❌ Buy of {} failed: {}", info.symbol, reason)).await;
            return EntryOutcome::Failed(reason);
        }

        match self.ledger.open(&info, strategy, &result).await {
            Ok(position) => {
                notify(
                    self.notifier.as_ref(),
                    &format!(
                        "🟢 Bought {} ({}) for {:.6} ETH @ {:.10}, tx {}",
                        position.symbol,
                        strategy,
                        position.cost_basis,
                        position.entry_price,
                        position.entry_tx_hash.as_deref().unwrap_or("-")
                    ),
                )
                .await;
                EntryOutcome::Opened(position)
            }
            Err(e) => {
                error!("❌ Bought {} but could not open the position: {}", info.symbol, e);
                EntryOutcome::Failed(e.to_string())
            }
        }
    }
}
