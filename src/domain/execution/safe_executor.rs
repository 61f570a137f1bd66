//! Risk-aware trade wrapper: authorize once, retry transient failures, record what reached the chain

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::risk::RiskGate;
use crate::shared::errors::TradeError;
use crate::shared::types::{AddressExt, TradeDirection};

use super::retry::{retry_async, RetryPolicy};
use super::{TradeExecution, TradeRequest, TradeResult};

pub struct SafeTradeExecutor {
    executor: Arc<dyn TradeExecution>,
    risk: Arc<RiskGate>,
    retry: RetryPolicy,
}

impl SafeTradeExecutor {
    pub fn new(executor: Arc<dyn TradeExecution>, risk: Arc<RiskGate>, retry: RetryPolicy) -> Self {
        Self { executor, risk, retry }
    }

    pub fn risk(&self) -> &Arc<RiskGate> {
        &self.risk
    }

    /// Risk-gated trade.
    ///
    /// `size` is the trade's weight in base units: the ETH spent on a buy, the
    /// cost basis being sold on a sell. `Err(RiskBlocked)` means no attempt was made.
    pub async fn execute(&self, request: &TradeRequest, size: f64) -> Result<TradeResult, TradeError> {
        let direction = TradeDirection::from_is_buy(request.is_buy);

        let decision = self.risk.evaluate(direction, size, request.token()).await;
        if !decision.approved {
            let reason = decision.reason.unwrap_or_else(|| "blocked".to_string());
            return Err(TradeError::RiskBlocked(reason));
        }

        let result = self.execute_with_retry(request).await;
        self.settle(request, size, &result).await;
        Ok(result)
    }

    /// Exit of an open position: never gated, recorded once it reaches the chain.
    ///
    /// `cost_basis` is the share of the position's cost leaving the book.
    pub async fn execute_exit(&self, request: &TradeRequest, cost_basis: f64) -> TradeResult {
        let result = self.execute_with_retry(request).await;
        self.settle(request, cost_basis, &result).await;
        result
    }

    /// Attempt sequence without the gate or any bookkeeping
    pub async fn execute_with_retry(&self, request: &TradeRequest) -> TradeResult {
        let executor = self.executor.clone();
        let attempts = self.retry.max_attempts;
        let outcome = retry_async(&self.retry, |failed: &TradeResult| failed.is_retryable(), |attempt| {
            let executor = executor.clone();
            async move {
                if attempt > 1 {
                    info!("🔄 Retrying trade (attempt {}/{})", attempt, attempts);
                }
                let result = executor.execute(request).await;
                if result.success {
                    Ok(result)
                } else {
                    Err(result)
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(result) => {
                if let Some(e) = &result.error {
                    warn!("❌ Trade failed for {}: {}", request.token().short(), e);
                }
                result
            }
        }
    }

    /// One risk record per attempt sequence that broadcast, plus exposure bookkeeping.
    ///
    /// A failure before broadcast spent nothing and is not a trade, so it leaves
    /// the counters and the loss streak alone.
    async fn settle(&self, request: &TradeRequest, size: f64, result: &TradeResult) {
        if !result.reached_chain() {
            debug!(
                "Trade for {} never reached the chain, not recorded: {:?}",
                request.token().short(),
                result.error
            );
            return;
        }

        let direction = TradeDirection::from_is_buy(request.is_buy);
        let pnl = Self::realized_pnl(result, request.is_buy, size);
        // a sale below cost counts against the loss streak
        let won = result.success && (request.is_buy || pnl >= 0.0);
        self.risk.record_trade(won, direction, request.token(), pnl).await;

        if result.success {
            if request.is_buy {
                self.risk.add_exposure(size).await;
            } else {
                self.risk.release_exposure(size).await;
            }
        }
    }

    /// Buys carry no PnL; sells realize proceeds minus cost basis; failures lose their gas
    fn realized_pnl(result: &TradeResult, is_buy: bool, size: f64) -> f64 {
        if !result.success {
            return -result.gas_cost_eth();
        }
        if is_buy {
            0.0
        } else {
            result.sale_pnl(size)
        }
    }
}
