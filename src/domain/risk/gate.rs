//! Risk gate: serialized access to the process-wide risk state

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::persistence::StateStore;
use crate::shared::errors::AppError;
use crate::shared::types::{Address, AddressExt, TradeDirection};

use super::report;
use super::{RiskDecision, RiskLimits, RiskState};

/// Authorizes trades and records their outcomes.
///
/// Every read and update of the counters happens under one mutex.
pub struct RiskGate {
    limits: RiskLimits,
    state: Mutex<RiskState>,
    store: Option<Arc<dyn StateStore>>,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(RiskState::new(Utc::now())),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Restore persisted counters, if any. Returns true when state was found.
    pub async fn load(&self) -> Result<bool, AppError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.load_risk_state().await? {
            Some(saved) => {
                info!(
                    "📂 Risk state restored: {} trades today, streak {}, level {}",
                    saved.trades_today, saved.loss_streak, saved.risk_level
                );
                *self.state.lock().await = saved;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn authorize(&self, direction: TradeDirection, amount: f64, token: Address) -> bool {
        self.evaluate_at(direction, amount, token, Utc::now()).await.approved
    }

    pub async fn authorize_at(&self, direction: TradeDirection, amount: f64, token: Address, now: DateTime<Utc>) -> bool {
        self.evaluate_at(direction, amount, token, now).await.approved
    }

    /// Authorization with the block reason attached
    pub async fn evaluate(&self, direction: TradeDirection, amount: f64, token: Address) -> RiskDecision {
        self.evaluate_at(direction, amount, token, Utc::now()).await
    }

    pub async fn evaluate_at(
        &self,
        direction: TradeDirection,
        amount: f64,
        token: Address,
        now: DateTime<Utc>,
    ) -> RiskDecision {
        let mut state = self.state.lock().await;
        let decision = state.evaluate(&self.limits, direction, amount, token, now);
        if let Some(reason) = &decision.reason {
            warn!("🚫 Trade blocked ({} {:.6} {}): {}", direction, amount, token.short(), reason);
        }
        decision
    }

    /// Reason recorded by the last refused authorization
    pub async fn block_reason(&self) -> Option<String> {
        self.state.lock().await.last_block_reason.clone()
    }

    pub async fn record_trade(&self, success: bool, direction: TradeDirection, token: Address, pnl: f64) {
        self.record_trade_at(success, direction, token, pnl, Utc::now()).await
    }

    pub async fn record_trade_at(
        &self,
        success: bool,
        direction: TradeDirection,
        token: Address,
        pnl: f64,
        now: DateTime<Utc>,
    ) {
        let snapshot = {
            let mut state = self.state.lock().await;
            let before = state.risk_level;
            state.record(&self.limits, success, direction, token, pnl, now);
            if state.risk_level != before {
                warn!("⚠️ Risk level {} -> {} (loss streak {})", before, state.risk_level, state.loss_streak);
            }
            state.clone()
        };
        self.persist(&snapshot).await;
    }

    pub async fn add_exposure(&self, amount: f64) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.add_exposure(amount);
            state.clone()
        };
        self.persist(&snapshot).await;
    }

    pub async fn release_exposure(&self, amount: f64) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.release_exposure(amount);
            state.clone()
        };
        self.persist(&snapshot).await;
    }

    pub async fn snapshot(&self) -> RiskState {
        self.state.lock().await.clone()
    }

    pub async fn restore(&self, state: RiskState) {
        *self.state.lock().await = state;
    }

    pub async fn report(&self) -> String {
        self.report_at(Utc::now()).await
    }

    pub async fn report_at(&self, now: DateTime<Utc>) -> String {
        let state = self.state.lock().await;
        report::render(&state, &self.limits, now)
    }

    async fn persist(&self, state: &RiskState) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_risk_state(state).await {
                warn!("⚠️ Failed to persist risk state: {}", e);
            }
        }
    }
}
