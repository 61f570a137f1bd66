//! Position ledger: one position per token, advanced by a periodic tick

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::domain::execution::{SafeTradeExecutor, TradeRequest, TradeResult};
use crate::domain::external::{notify, NotificationSink};
use crate::domain::persistence::StateStore;
use crate::domain::portfolio::RealizedProfitSource;
use crate::shared::errors::AppError;
use crate::shared::types::{Address, TokenInfo};
use crate::shared::utils::{scale_amount, wei_to_eth};

use super::exit_rules::{self, ExitAction};
use super::{ExitReason, Position, PositionConfig, PriceSource, Strategy};

/// Outcome counters of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: usize,
    pub partial_exits: usize,
    pub full_exits: usize,
    pub failed_exits: usize,
    /// Triggered exits skipped while the position backs off from a failure
    pub deferred_exits: usize,
    pub price_errors: usize,
}

/// Consecutive failed exits of one position
#[derive(Debug, Clone, Copy)]
struct ExitBackoff {
    failures: u32,
    retry_at: DateTime<Utc>,
}

/// Capacity held for a buy in flight, given back on drop
#[derive(Debug)]
pub struct EntrySlot {
    reserved: Arc<StdMutex<usize>>,
}

impl Drop for EntrySlot {
    fn drop(&mut self) {
        if let Ok(mut reserved) = self.reserved.lock() {
            *reserved = reserved.saturating_sub(1);
        }
    }
}

pub struct PositionLedger {
    positions: RwLock<HashMap<Address, Position>>,
    /// Held for a whole tick so two ticks never race on one position
    tick_lock: Mutex<()>,
    executor: Arc<SafeTradeExecutor>,
    prices: Arc<dyn PriceSource>,
    notifier: Arc<dyn NotificationSink>,
    store: Option<Arc<dyn StateStore>>,
    config: PositionConfig,
    weth: Address,
    realized: Mutex<f64>,
    exit_backoff: Mutex<HashMap<Address, ExitBackoff>>,
    /// Entry slots handed out and not yet dropped
    reserved: Arc<StdMutex<usize>>,
}

impl PositionLedger {
    pub fn new(
        executor: Arc<SafeTradeExecutor>,
        prices: Arc<dyn PriceSource>,
        notifier: Arc<dyn NotificationSink>,
        config: PositionConfig,
        weth: Address,
    ) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            tick_lock: Mutex::new(()),
            executor,
            prices,
            notifier,
            store: None,
            config,
            weth,
            realized: Mutex::new(0.0),
            exit_backoff: Mutex::new(HashMap::new()),
            reserved: Arc::new(StdMutex::new(0)),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    /// Reload persisted positions. Returns how many were restored.
    pub async fn restore(&self) -> Result<usize, AppError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let loaded = store.load_positions().await?;
        let mut positions = self.positions.write().await;
        for position in loaded.into_iter().filter(Position::is_open) {
            info!(
                "📂 Restored {} position in {} ({:.6} tokens, basis {:.6} ETH)",
                position.strategy, position.symbol, position.entry_amount, position.cost_basis
            );
            positions.insert(position.token, position);
        }
        Ok(positions.len())
    }

    /// Record a new position from a successful buy
    pub async fn open(&self, info: &TokenInfo, strategy: Strategy, buy: &TradeResult) -> Result<Position, AppError> {
        self.open_at(info, strategy, buy, Utc::now()).await
    }

    pub async fn open_at(
        &self,
        info: &TokenInfo,
        strategy: Strategy,
        buy: &TradeResult,
        now: DateTime<Utc>,
    ) -> Result<Position, AppError> {
        let position = Position::open(info, strategy, buy, &self.config, now)?;
        {
            let mut positions = self.positions.write().await;
            if positions.contains_key(&info.address) {
                return Err(AppError::PositionExists(info.address.to_string()));
            }
            positions.insert(position.token, position.clone());
        }
        self.persist(&position).await;

        info!(
            "🟢 Opened {} position in {}: {:.6} tokens @ {:.10} ETH, stop {:.10}",
            strategy, position.symbol, position.entry_amount, position.entry_price, position.stop_loss_price
        );
        Ok(position)
    }

    pub async fn contains(&self, token: Address) -> bool {
        self.positions.read().await.contains_key(&token)
    }

    pub async fn get(&self, token: Address) -> Option<Position> {
        self.positions.read().await.get(&token).cloned()
    }

    pub async fn len(&self) -> usize {
        self.positions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.positions.read().await.is_empty()
    }

    /// Claim one of `max_positions` for a pending buy.
    ///
    /// Open positions and live slots both count, so concurrent candidates can
    /// never overfill the book. Keep the slot until the position is opened.
    pub async fn reserve_slot(&self) -> Option<EntrySlot> {
        let positions = self.positions.read().await;
        let mut reserved = self.reserved.lock().ok()?;
        if positions.len() + *reserved >= self.config.max_positions {
            return None;
        }
        *reserved += 1;
        Some(EntrySlot {
            reserved: self.reserved.clone(),
        })
    }

    /// Open positions ordered by token address
    pub async fn positions(&self) -> Vec<Position> {
        let mut all: Vec<Position> = self.positions.read().await.values().cloned().collect();
        all.sort_by_key(|p| p.token);
        all
    }

    /// Net realized profit of all exits so far, in base units
    pub async fn realized_profit(&self) -> f64 {
        *self.realized.lock().await
    }

    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Advance every open position by one evaluation cycle.
    ///
    /// Positions are visited one at a time in address order; a failure on one
    /// never stops the others.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        let mut report = TickReport::default();

        let mut tokens: Vec<Address> = self.positions.read().await.keys().copied().collect();
        tokens.sort();

        for token in tokens {
            let Some((decimals, symbol)) = self
                .positions
                .read()
                .await
                .get(&token)
                .map(|p| (p.decimals, p.symbol.clone()))
            else {
                continue;
            };

            let price = match self.prices.price(token, decimals).await {
                Ok(price) if price > 0.0 && price.is_finite() => price,
                Ok(price) => {
                    warn!("⚠️ Ignoring price {} for {}", price, symbol);
                    report.price_errors += 1;
                    continue;
                }
                Err(e) => {
                    warn!("⚠️ No price for {}: {}", symbol, e);
                    report.price_errors += 1;
                    continue;
                }
            };

            let (snapshot, action, moved) = {
                let mut positions = self.positions.write().await;
                let Some(position) = positions.get_mut(&token) else {
                    continue;
                };
                let moved = exit_rules::update_price(position, price, &self.config);
                let action = exit_rules::evaluate(position, &self.config, now);
                (position.clone(), action, moved)
            };
            report.evaluated += 1;

            debug!(
                "📈 {} @ {:.10} ETH pnl {:+.2}% trail {:.10}",
                snapshot.symbol, price, snapshot.pnl_percent, snapshot.trailing_stop_price
            );

            if action.is_some() {
                if let Some(retry_at) = self.exit_retry_at(token, now).await {
                    debug!("⏸️ Exit for {} held back until {}", snapshot.symbol, retry_at);
                    report.deferred_exits += 1;
                    if moved {
                        self.persist(&snapshot).await;
                    }
                    continue;
                }
            }

            let exited = match action {
                Some(ExitAction::Full(reason)) => {
                    let done = self.exit_full(&snapshot, reason).await;
                    if done {
                        report.full_exits += 1;
                    }
                    done
                }
                Some(ExitAction::Partial { level, fraction }) => {
                    let done = self.exit_partial(&snapshot, level, fraction).await;
                    if done {
                        report.partial_exits += 1;
                    }
                    done
                }
                None => {
                    if moved {
                        self.persist(&snapshot).await;
                    }
                    continue;
                }
            };

            if exited {
                self.exit_backoff.lock().await.remove(&token);
            } else {
                report.failed_exits += 1;
                self.back_off_exit(token, &snapshot.symbol, now).await;
            }
        }

        report
    }

    /// When a previous exit of `token` failed and its wait has not elapsed
    async fn exit_retry_at(&self, token: Address, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.exit_backoff
            .lock()
            .await
            .get(&token)
            .map(|b| b.retry_at)
            .filter(|retry_at| now < *retry_at)
    }

    async fn back_off_exit(&self, token: Address, symbol: &str, now: DateTime<Utc>) {
        let mut backoff = self.exit_backoff.lock().await;
        let failures = backoff.get(&token).map_or(0, |b| b.failures) + 1;
        let wait = self.exit_retry_delay(failures);
        backoff.insert(
            token,
            ExitBackoff {
                failures,
                retry_at: now + wait,
            },
        );
        warn!("⏳ {} exit failed {} time(s), next attempt in {}s", symbol, failures, wait.num_seconds());
    }

    /// `exit_retry_secs` doubled per consecutive failure, capped at `max_exit_retry_secs`
    fn exit_retry_delay(&self, failures: u32) -> chrono::Duration {
        let doublings = failures.saturating_sub(1).min(20);
        let secs = self
            .config
            .exit_retry_secs
            .saturating_mul(1u64 << doublings)
            .min(self.config.max_exit_retry_secs);
        chrono::Duration::from_std(std::time::Duration::from_secs(secs)).unwrap_or_else(|_| chrono::Duration::days(1))
    }

    /// Sell the whole holding. Returns true when the position left the ledger.
    async fn exit_full(&self, position: &Position, reason: ExitReason) -> bool {
        info!(
            "🚨 {} triggered for {} @ {:.10} ETH ({:+.2}%)",
            reason, position.symbol, position.current_price, position.pnl_percent
        );

        let request = TradeRequest::sell(position.token, self.weth, position.amount_raw);
        let result = self.executor.execute_exit(&request, position.cost_basis).await;
        if !result.success {
            self.report_failed_exit(position, &reason.to_string(), &result).await;
            return false;
        }

        let pnl = result.sale_pnl(position.cost_basis);
        let total = position.realized_pnl + pnl;
        self.positions.write().await.remove(&position.token);
        *self.realized.lock().await += pnl;

        if let Some(store) = &self.store {
            if let Err(e) = store.remove_position(position.token).await {
                warn!("⚠️ Failed to remove stored position {}: {}", position.symbol, e);
            }
        }

        info!(
            "🔴 Closed {} ({}): received {:.6} ETH, position PnL {:+.6} ETH",
            position.symbol,
            reason,
            wei_to_eth(result.amount_out),
            total
        );
        let message = format!(
            "🔴 {} {}: sold {} for {:.6} ETH, PnL {:+.6} ETH{}",
            reason,
            position.symbol,
            position.token,
            wei_to_eth(result.amount_out),
            total,
            result.tx_hash.as_deref().map(|h| format!(" ({})", h)).unwrap_or_default()
        );
        notify(self.notifier.as_ref(), &message).await;
        true
    }

    /// Sell `fraction` of the holding for ladder `level`. The level is consumed only on success.
    async fn exit_partial(&self, position: &Position, level: f64, fraction: f64) -> bool {
        let sell_raw = scale_amount(position.amount_raw, fraction);
        if sell_raw == 0 || sell_raw >= position.amount_raw {
            return self.exit_full(position, ExitReason::TakeProfit).await;
        }
        let released_basis = position.cost_basis * (sell_raw as f64 / position.amount_raw as f64);

        info!(
            "💰 Take profit +{:.0}% on {}: selling {:.0}% @ {:.10} ETH",
            level * 100.0,
            position.symbol,
            fraction * 100.0,
            position.current_price
        );

        let request = TradeRequest::sell(position.token, self.weth, sell_raw);
        let result = self.executor.execute_exit(&request, released_basis).await;
        if !result.success {
            self.report_failed_exit(position, &format!("Take profit +{:.0}%", level * 100.0), &result)
                .await;
            return false;
        }

        let pnl = result.sale_pnl(released_basis);
        let updated = {
            let mut positions = self.positions.write().await;
            let Some(current) = positions.get_mut(&position.token) else {
                return false;
            };
            current.apply_partial_exit(level, sell_raw, pnl);
            current.clone()
        };
        *self.realized.lock().await += pnl;
        self.persist(&updated).await;

        let message = format!(
            "💰 Take profit +{:.0}% on {}: sold {:.0}% for {:.6} ETH (PnL {:+.6} ETH), {} levels left",
            level * 100.0,
            updated.symbol,
            fraction * 100.0,
            wei_to_eth(result.amount_out),
            pnl,
            updated.take_profit_levels.len()
        );
        notify(self.notifier.as_ref(), &message).await;
        true
    }

    async fn report_failed_exit(&self, position: &Position, what: &str, result: &TradeResult) {
        let reason = result
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        error!("❌ {} exit failed for {}: {}", what, position.symbol, reason);
        notify(
            self.notifier.as_ref(),
            &format!("❌ {} exit failed for {}: {}", what, position.symbol, reason),
        )
        .await;
    }

    async fn persist(&self, position: &Position) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_position(position).await {
                warn!("⚠️ Failed to persist position {}: {}", position.symbol, e);
            }
        }
    }
}

#[async_trait]
impl RealizedProfitSource for PositionLedger {
    async fn realized_profit(&self) -> f64 {
        PositionLedger::realized_profit(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::RetryPolicy;
    use crate::domain::position::tests::{buy_result, token_info};
    use crate::domain::position::PositionStatus;
    use crate::domain::risk::{RiskGate, RiskLevel, RiskLimits};
    use crate::infrastructure::storage::MemoryStore;
    use crate::shared::errors::TradeError;
    use crate::shared::types::TradeDirection;
    use crate::test_support::{FakePriceSource, RecordingNotifier, ScriptedExecution};

    const WETH: Address = Address::repeat_byte(0x42);

    struct Harness {
        ledger: PositionLedger,
        exec: Arc<ScriptedExecution>,
        prices: Arc<FakePriceSource>,
        notifier: Arc<RecordingNotifier>,
        risk: Arc<RiskGate>,
        store: Arc<MemoryStore>,
    }

    fn harness(script: Vec<TradeResult>) -> Harness {
        let exec = Arc::new(ScriptedExecution::new(script));
        let risk = Arc::new(RiskGate::new(RiskLimits::default()));
        let safe = Arc::new(SafeTradeExecutor::new(exec.clone(), risk.clone(), RetryPolicy::none()));
        let prices = Arc::new(FakePriceSource::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let store = Arc::new(MemoryStore::new());
        let ledger = PositionLedger::new(safe, prices.clone(), notifier.clone(), PositionConfig::default(), WETH)
            .with_store(store.clone());
        Harness {
            ledger,
            exec,
            prices,
            notifier,
            risk,
            store,
        }
    }

    #[tokio::test]
    async fn test_one_position_per_token() {
        let h = harness(vec![]);
        h.ledger.open(&token_info(), Strategy::Memecoin, &buy_result()).await.unwrap();
        let err = h.ledger.open(&token_info(), Strategy::Memecoin, &buy_result()).await.unwrap_err();
        assert!(matches!(err, AppError::PositionExists(_)));
        assert_eq!(h.ledger.len().await, 1);
        assert_eq!(h.store.load_positions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_loss_closes_and_removes() {
        // 0.001 tokens sold for 0.0008 ETH
        let h = harness(vec![ScriptedExecution::ok(800_000_000_000_000)]);
        let info = token_info();
        h.ledger.open(&info, Strategy::Memecoin, &buy_result()).await.unwrap();
        h.prices.set(info.address, 0.80).await;

        let report = h.ledger.tick().await;
        assert_eq!(report.full_exits, 1);
        assert!(!h.ledger.contains(info.address).await);
        assert!(h.store.load_positions().await.unwrap().is_empty());
        assert!((h.ledger.realized_profit().await + 0.0002).abs() < 1e-12);

        let sold = h.exec.requests();
        assert_eq!(sold.len(), 1);
        assert!(!sold[0].is_buy);
        assert_eq!(sold[0].amount_in, 1_000_000_000_000_000);

        assert_eq!(h.risk.snapshot().await.loss_streak, 1);
        assert!(h.notifier.messages().await.iter().any(|m| m.contains("Stop Loss")));
    }

    #[tokio::test]
    async fn test_take_profit_sells_quarter_and_consumes_level() {
        let h = harness(vec![ScriptedExecution::ok(325_000_000_000_000)]);
        let info = token_info();
        h.ledger.open(&info, Strategy::Memecoin, &buy_result()).await.unwrap();
        h.prices.set(info.address, 1.30).await;

        let report = h.ledger.tick().await;
        assert_eq!(report.partial_exits, 1);

        let p = h.ledger.get(info.address).await.unwrap();
        assert_eq!(p.status, PositionStatus::TakingProfit);
        assert_eq!(p.take_profit_levels, vec![0.5, 1.0, 2.0]);
        assert_eq!(p.amount_raw, 750_000_000_000_000);
        assert!((p.cost_basis - 0.00075).abs() < 1e-15);
        assert_eq!(h.exec.requests()[0].amount_in, 250_000_000_000_000);

        // same price next tick: nothing left to fire
        let report = h.ledger.tick().await;
        assert_eq!(report.partial_exits, 0);
        assert_eq!(h.exec.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_partial_keeps_level() {
        let h = harness(vec![ScriptedExecution::err(TradeError::TransactionReverted("0x1".into()))]);
        let info = token_info();
        h.ledger.open(&info, Strategy::Memecoin, &buy_result()).await.unwrap();
        h.prices.set(info.address, 1.30).await;

        let report = h.ledger.tick().await;
        assert_eq!(report.failed_exits, 1);
        let p = h.ledger.get(info.address).await.unwrap();
        assert_eq!(p.take_profit_levels.len(), 4);
        assert_eq!(p.status, PositionStatus::Active);
        assert!(h.notifier.messages().await.iter().any(|m| m.contains("exit failed")));
    }

    #[tokio::test]
    async fn test_failing_exit_backs_off_without_tripping_risk() {
        // empty script: every sell fails before broadcast
        let h = harness(vec![]);
        let info = token_info();
        let t0 = Utc::now();
        h.ledger.open_at(&info, Strategy::Memecoin, &buy_result(), t0).await.unwrap();
        h.prices.set(info.address, 0.80).await;

        let mut failed = 0;
        let mut deferred = 0;
        for i in 0..10 {
            let report = h.ledger.tick_at(t0 + chrono::Duration::seconds(5 * i)).await;
            failed += report.failed_exits;
            deferred += report.deferred_exits;
        }

        // attempts at 0s and 30s, the rest wait out the backoff
        assert_eq!(h.exec.calls(), 2);
        assert_eq!(failed, 2);
        assert_eq!(deferred, 8);
        assert!(h.ledger.contains(info.address).await);

        let state = h.risk.snapshot().await;
        assert_eq!(state.trades_today, 0);
        assert_eq!(state.loss_streak, 0);
        assert_eq!(state.risk_level, RiskLevel::Low);
        assert!(h.risk.authorize(TradeDirection::Buy, 0.001, Address::repeat_byte(0x07)).await);
    }

    #[tokio::test]
    async fn test_exit_after_backoff_clears_it() {
        let h = harness(vec![
            ScriptedExecution::err(TradeError::QuoteUnavailable),
            ScriptedExecution::ok(800_000_000_000_000),
        ]);
        let info = token_info();
        let t0 = Utc::now();
        h.ledger.open_at(&info, Strategy::Memecoin, &buy_result(), t0).await.unwrap();
        h.prices.set(info.address, 0.80).await;

        assert_eq!(h.ledger.tick_at(t0).await.failed_exits, 1);
        assert_eq!(h.ledger.tick_at(t0 + chrono::Duration::seconds(10)).await.deferred_exits, 1);
        assert_eq!(h.ledger.tick_at(t0 + chrono::Duration::seconds(30)).await.full_exits, 1);
        assert!(!h.ledger.contains(info.address).await);
        assert!(h.ledger.exit_backoff.lock().await.is_empty());
    }

    #[test]
    fn test_exit_retry_delay_doubles_up_to_cap() {
        let h = harness(vec![]);
        let secs: Vec<i64> = (1..=7).map(|n| h.ledger.exit_retry_delay(n).num_seconds()).collect();
        assert_eq!(secs, vec![30, 60, 120, 240, 480, 600, 600]);
        assert_eq!(h.ledger.exit_retry_delay(u32::MAX).num_seconds(), 600);
    }

    #[tokio::test]
    async fn test_price_failure_does_not_stop_other_positions() {
        let h = harness(vec![ScriptedExecution::ok(800_000_000_000_000)]);
        let first = token_info();
        let mut second = token_info();
        second.address = Address::repeat_byte(0x02);
        second.symbol = "WOJAK".into();
        h.ledger.open(&first, Strategy::Memecoin, &buy_result()).await.unwrap();
        h.ledger.open(&second, Strategy::Memecoin, &buy_result()).await.unwrap();
        h.prices.set(second.address, 0.5).await;

        let report = h.ledger.tick().await;
        assert_eq!(report.price_errors, 1);
        assert_eq!(report.full_exits, 1);
        assert!(h.ledger.contains(first.address).await);
        assert!(!h.ledger.contains(second.address).await);
    }

    #[tokio::test]
    async fn test_slots_count_against_capacity_until_dropped() {
        let h = harness(vec![]);
        let slots: Vec<EntrySlot> = vec![
            h.ledger.reserve_slot().await.unwrap(),
            h.ledger.reserve_slot().await.unwrap(),
        ];
        h.ledger.open(&token_info(), Strategy::Memecoin, &buy_result()).await.unwrap();
        assert!(h.ledger.reserve_slot().await.is_none());

        drop(slots);
        let slot = h.ledger.reserve_slot().await;
        assert!(slot.is_some());
        assert!(h.ledger.reserve_slot().await.is_some());
    }

    #[tokio::test]
    async fn test_restore_reloads_open_positions() {
        let h = harness(vec![]);
        h.ledger.open(&token_info(), Strategy::Altcoin, &buy_result()).await.unwrap();

        let prices = Arc::new(FakePriceSource::new());
        let safe = Arc::new(SafeTradeExecutor::new(h.exec.clone(), h.risk.clone(), RetryPolicy::none()));
        let reborn = PositionLedger::new(safe, prices, h.notifier.clone(), PositionConfig::default(), WETH)
            .with_store(h.store.clone());
        assert_eq!(reborn.restore().await.unwrap(), 1);
        assert_eq!(reborn.positions().await[0].strategy, Strategy::Altcoin);
    }
}
