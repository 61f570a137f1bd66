//! Mutable risk counters and the authorization rules that read them

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::shared::types::{Address, TradeDirection};

use super::{PerformanceMetrics, RiskDecision, RiskEvent, RiskEventKind, RiskLevel, RiskLimits, TradeRecord};

pub const HISTORY_LIMIT: usize = 1000;
pub const EVENT_LIMIT: usize = 1000;
const DAILY_PNL_RETENTION_DAYS: i64 = 30;

/// Process-wide risk counters. Persisted as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub current_day: NaiveDate,
    pub trades_today: u32,
    pub loss_streak: u32,
    pub realized_pnl: f64,
    pub daily_pnl: BTreeMap<NaiveDate, f64>,
    /// Last trade time per `direction:token`
    pub last_trade: HashMap<String, DateTime<Utc>>,
    pub risk_level: RiskLevel,
    pub total_exposure: f64,
    pub metrics: PerformanceMetrics,
    pub history: VecDeque<TradeRecord>,
    pub events: VecDeque<RiskEvent>,
    #[serde(skip)]
    pub last_block_reason: Option<String>,
}

fn cooldown_key(direction: TradeDirection, token: Address) -> String {
    format!("{}:{}", direction, token)
}

impl RiskState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current_day: now.date_naive(),
            trades_today: 0,
            loss_streak: 0,
            realized_pnl: 0.0,
            daily_pnl: BTreeMap::new(),
            last_trade: HashMap::new(),
            risk_level: RiskLevel::Low,
            total_exposure: 0.0,
            metrics: PerformanceMetrics::default(),
            history: VecDeque::new(),
            events: VecDeque::new(),
            last_block_reason: None,
        }
    }

    /// Reset daily counters when the UTC date changes. Returns true on rollover.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if today == self.current_day {
            return false;
        }
        self.current_day = today;
        self.trades_today = 0;
        self.loss_streak = 0;
        let horizon = today - Duration::days(DAILY_PNL_RETENTION_DAYS);
        self.daily_pnl.retain(|day, _| *day >= horizon);
        true
    }

    pub fn today_pnl(&self) -> f64 {
        self.daily_pnl.get(&self.current_day).copied().unwrap_or(0.0)
    }

    /// Apply the checks in order; the first failing one blocks
    pub fn evaluate(
        &mut self,
        limits: &RiskLimits,
        direction: TradeDirection,
        amount: f64,
        token: Address,
        now: DateTime<Utc>,
    ) -> RiskDecision {
        self.roll_day(now);

        let decision = self.first_violation(limits, direction, amount, token, now);
        match &decision.reason {
            Some(reason) => {
                self.last_block_reason = Some(reason.clone());
                self.push_event(now, RiskEventKind::Blocked, token, reason.clone());
            }
            None => {
                self.last_block_reason = None;
                self.push_event(
                    now,
                    RiskEventKind::Approved,
                    token,
                    format!("Trade approved: {} {:.6}", direction, amount),
                );
            }
        }
        decision
    }

    fn first_violation(
        &self,
        limits: &RiskLimits,
        direction: TradeDirection,
        amount: f64,
        token: Address,
        now: DateTime<Utc>,
    ) -> RiskDecision {
        if self.risk_level == RiskLevel::Critical {
            return RiskDecision::block("Risk level is CRITICAL");
        }

        let single_limit = limits.capital * limits.max_exposure;
        if amount > single_limit {
            return RiskDecision::block(format!(
                "Exposure {:.6} exceeds per-trade limit {:.6}",
                amount, single_limit
            ));
        }

        let total_limit = limits.capital * limits.max_total_exposure;
        if self.total_exposure + amount > total_limit {
            return RiskDecision::block(format!(
                "Total exposure {:.6} would exceed {:.6}",
                self.total_exposure + amount,
                total_limit
            ));
        }

        if self.trades_today >= limits.max_trades_per_day {
            return RiskDecision::block(format!(
                "Daily trade limit reached ({}/{})",
                self.trades_today, limits.max_trades_per_day
            ));
        }

        if self.loss_streak >= limits.max_consecutive_losses {
            return RiskDecision::block(format!("Too many consecutive losses ({})", self.loss_streak));
        }

        let today_pnl = self.today_pnl();
        if today_pnl < -limits.max_daily_drawdown * limits.capital {
            return RiskDecision::block(format!("Daily drawdown exceeded: {:.6}", today_pnl));
        }

        if let Some(last) = self.last_trade.get(&cooldown_key(direction, token)) {
            let elapsed = now.signed_duration_since(*last).num_milliseconds();
            let cooldown_ms = (limits.cooldown_secs as i64) * 1000;
            if elapsed < cooldown_ms {
                return RiskDecision::block(format!(
                    "Cooldown active ({}s remaining)",
                    (cooldown_ms - elapsed + 999) / 1000
                ));
            }
        }

        if self.risk_level == RiskLevel::High && amount > single_limit * limits.high_risk_size_factor {
            return RiskDecision::block(format!(
                "Position size {:.6} too large at HIGH risk (limit {:.6})",
                amount,
                single_limit * limits.high_risk_size_factor
            ));
        }

        RiskDecision::approve()
    }

    /// Update counters after a completed trade attempt sequence
    pub fn record(
        &mut self,
        limits: &RiskLimits,
        success: bool,
        direction: TradeDirection,
        token: Address,
        pnl: f64,
        now: DateTime<Utc>,
    ) {
        self.roll_day(now);

        self.trades_today += 1;
        self.metrics.total_trades += 1;
        if success {
            self.loss_streak = 0;
            self.metrics.winning_trades += 1;
            self.metrics.total_profit += pnl.max(0.0);
        } else {
            self.loss_streak += 1;
            self.metrics.losing_trades += 1;
            self.metrics.total_loss += pnl.abs();
        }

        self.realized_pnl += pnl;
        *self.daily_pnl.entry(self.current_day).or_insert(0.0) += pnl;
        self.last_trade.insert(cooldown_key(direction, token), now);

        self.metrics.win_rate = self.metrics.winning_trades as f64 / self.metrics.total_trades as f64;
        if self.metrics.total_loss > 0.0 {
            self.metrics.profit_factor = self.metrics.total_profit / self.metrics.total_loss;
        }
        if pnl < 0.0 {
            self.metrics.current_drawdown += pnl.abs();
            if self.metrics.current_drawdown > self.metrics.max_drawdown {
                self.metrics.max_drawdown = self.metrics.current_drawdown;
            }
        } else {
            self.metrics.current_drawdown = (self.metrics.current_drawdown - pnl).max(0.0);
        }

        self.history.push_back(TradeRecord {
            timestamp: now,
            token,
            direction,
            success,
            pnl,
            cumulative_pnl: self.realized_pnl,
        });
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }

        self.update_risk_level(limits, success);

        let kind = if success { RiskEventKind::Success } else { RiskEventKind::Failure };
        self.push_event(now, kind, token, format!("{} {} pnl {:+.6}", direction, kind_word(success), pnl));
    }

    /// Escalate toward the level the loss streak calls for, or step down after a success
    fn update_risk_level(&mut self, limits: &RiskLimits, success: bool) {
        if success {
            self.risk_level = self.risk_level.deescalate();
            return;
        }
        let target = if self.loss_streak >= limits.max_consecutive_losses {
            RiskLevel::Critical
        } else if self.loss_streak >= 3 {
            RiskLevel::High
        } else if self.loss_streak >= 2 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        if target > self.risk_level {
            self.risk_level = self.risk_level.escalate();
        }
    }

    pub fn add_exposure(&mut self, amount: f64) {
        self.total_exposure += amount.max(0.0);
    }

    pub fn release_exposure(&mut self, amount: f64) {
        self.total_exposure = (self.total_exposure - amount.max(0.0)).max(0.0);
    }

    fn push_event(&mut self, now: DateTime<Utc>, kind: RiskEventKind, token: Address, message: String) {
        self.events.push_back(RiskEvent {
            timestamp: now,
            kind,
            token,
            message,
        });
        while self.events.len() > EVENT_LIMIT {
            self.events.pop_front();
        }
    }

    /// Trades recorded within the 24h before `now`
    pub fn recent_trades(&self, now: DateTime<Utc>) -> impl Iterator<Item = &TradeRecord> {
        let cutoff = now - Duration::hours(24);
        self.history.iter().filter(move |t| t.timestamp > cutoff)
    }
}

fn kind_word(success: bool) -> &'static str {
    if success {
        "succeeded"
    } else {
        "failed"
    }
}
