//! Risk domain - trade authorization, loss-streak tracking and exposure limits

pub mod gate;
pub mod report;
pub mod state;

pub use gate::RiskGate;
pub use state::RiskState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared::types::{Address, TradeDirection};

/// Risk level, moved one step at a time by trade outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn escalate(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium => RiskLevel::High,
            RiskLevel::High | RiskLevel::Critical => RiskLevel::Critical,
        }
    }

    pub fn deescalate(self) -> Self {
        match self {
            RiskLevel::Critical => RiskLevel::High,
            RiskLevel::High => RiskLevel::Medium,
            RiskLevel::Medium | RiskLevel::Low => RiskLevel::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Static limits; amounts are base-asset units
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    pub capital: f64,
    /// Largest single trade as a fraction of capital
    pub max_exposure: f64,
    /// Largest open book as a fraction of capital
    pub max_total_exposure: f64,
    pub max_trades_per_day: u32,
    pub max_consecutive_losses: u32,
    /// Daily loss limit as a fraction of capital
    pub max_daily_drawdown: f64,
    pub cooldown_secs: u64,
    /// Share of the single-trade ceiling still allowed at `High` risk
    pub high_risk_size_factor: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            capital: 1.0,
            max_exposure: 0.1,
            max_total_exposure: 0.5,
            max_trades_per_day: 10,
            max_consecutive_losses: 5,
            max_daily_drawdown: 0.20,
            cooldown_secs: 30,
            high_risk_size_factor: 0.5,
        }
    }
}

/// Outcome of one authorization request
#[derive(Debug, Clone, PartialEq)]
pub struct RiskDecision {
    pub approved: bool,
    pub reason: Option<String>,
}

impl RiskDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    Approved,
    Blocked,
    Success,
    Failure,
}

impl RiskEventKind {
    pub fn emoji(&self) -> &'static str {
        match self {
            RiskEventKind::Approved => "✅",
            RiskEventKind::Blocked => "🚫",
            RiskEventKind::Success => "💰",
            RiskEventKind::Failure => "❌",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: RiskEventKind,
    pub token: Address,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub token: Address,
    pub direction: TradeDirection,
    pub success: bool,
    pub pnl: f64,
    pub cumulative_pnl: f64,
}

/// Running performance figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub max_drawdown: f64,
    pub current_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
}
