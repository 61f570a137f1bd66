//! Position domain - open positions and their exit lifecycle

pub mod exit_rules;
pub mod ledger;
pub mod price_source;

pub use exit_rules::ExitAction;
pub use ledger::{EntrySlot, PositionLedger, TickReport};
pub use price_source::{AggregatorPriceSource, PriceSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::execution::TradeResult;
use crate::shared::errors::AppError;
use crate::shared::types::{Address, TokenInfo};
use crate::shared::utils::{to_units, wei_to_eth};

/// Entry strategy, selects sizing and timeout rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Fresh launches, small size, short leash
    Memecoin,
    /// Established tokens, larger size, held up to a week
    Altcoin,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Memecoin => "memecoin",
            Strategy::Altcoin => "altcoin",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memecoin" | "sniper" => Ok(Strategy::Memecoin),
            "altcoin" | "swing" => Ok(Strategy::Altcoin),
            other => Err(AppError::ConfigError(format!("Unknown strategy: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Active,
    /// At least one ladder level has been sold
    TakingProfit,
    Closed,
}

impl PositionStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, PositionStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TakeProfit,
    TargetReached,
    Timeout,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExitReason::StopLoss => "Stop Loss",
            ExitReason::TrailingStop => "Trailing Stop",
            ExitReason::TakeProfit => "Take Profit",
            ExitReason::TargetReached => "Target reached",
            ExitReason::Timeout => "Timeout",
        };
        f.write_str(label)
    }
}

/// An open position in one token.
///
/// Prices are in base units (ETH) per whole token; `entry_amount` is the
/// currently held amount in whole tokens and shrinks with each partial exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub token: Address,
    pub symbol: String,
    pub decimals: u8,
    pub strategy: Strategy,
    pub entry_price: f64,
    pub entry_amount: f64,
    /// Held amount in raw token units
    pub amount_raw: u128,
    /// Cost of the amount still held, in base units
    pub cost_basis: f64,
    pub entry_time: DateTime<Utc>,
    pub current_price: f64,
    pub current_value: f64,
    pub pnl: f64,
    /// Unrealized PnL in percent (30.0 == +30%)
    pub pnl_percent: f64,
    pub status: PositionStatus,
    /// Remaining ladder levels as fractions of entry (0.25 == +25%), ascending
    pub take_profit_levels: Vec<f64>,
    pub stop_loss_price: f64,
    /// Zero until the price first moves above entry
    pub trailing_stop_price: f64,
    pub high_water_mark: f64,
    pub venue: Option<String>,
    pub entry_tx_hash: Option<String>,
    pub realized_pnl: f64,
}

impl Position {
    /// Build a position from a successful buy
    pub fn open(
        info: &TokenInfo,
        strategy: Strategy,
        buy: &TradeResult,
        config: &PositionConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        if !buy.success {
            return Err(AppError::ExecutionError(format!(
                "cannot open {} from a failed buy",
                info.symbol
            )));
        }
        let entry_amount = to_units(buy.amount_out, info.decimals);
        if buy.amount_out == 0 || entry_amount <= 0.0 {
            return Err(AppError::ExecutionError(format!("buy of {} returned no tokens", info.symbol)));
        }

        let cost_basis = wei_to_eth(buy.amount_in);
        let entry_price = cost_basis / entry_amount;

        let mut levels = config.take_profit_levels.clone();
        levels.sort_by(|a, b| a.total_cmp(b));

        Ok(Self {
            token: info.address,
            symbol: info.symbol.clone(),
            decimals: info.decimals,
            strategy,
            entry_price,
            entry_amount,
            amount_raw: buy.amount_out,
            cost_basis,
            entry_time: now,
            current_price: entry_price,
            current_value: cost_basis,
            pnl: 0.0,
            pnl_percent: 0.0,
            status: PositionStatus::Active,
            take_profit_levels: levels,
            stop_loss_price: entry_price * (1.0 - config.stop_loss),
            trailing_stop_price: 0.0,
            high_water_mark: entry_price,
            venue: buy.venue.clone(),
            entry_tx_hash: buy.tx_hash.clone(),
            realized_pnl: 0.0,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.entry_time).num_seconds().max(0) as f64 / 3600.0
    }

    /// Account for a successful partial sale of `sold_raw` units.
    ///
    /// Consumes `level` from the ladder and returns the cost basis released.
    pub fn apply_partial_exit(&mut self, level: f64, sold_raw: u128, pnl: f64) -> f64 {
        let sold_raw = sold_raw.min(self.amount_raw);
        let fraction = if self.amount_raw == 0 {
            0.0
        } else {
            sold_raw as f64 / self.amount_raw as f64
        };

        let released = self.cost_basis * fraction;
        self.cost_basis -= released;
        self.amount_raw -= sold_raw;
        self.entry_amount = to_units(self.amount_raw, self.decimals);
        self.current_value = self.current_price * self.entry_amount;
        self.pnl = self.current_value - self.cost_basis;
        self.realized_pnl += pnl;
        self.take_profit_levels.retain(|l| *l != level);
        self.status = PositionStatus::TakingProfit;
        released
    }

    pub fn close(&mut self, pnl: f64) {
        self.realized_pnl += pnl;
        self.cost_basis = 0.0;
        self.amount_raw = 0;
        self.entry_amount = 0.0;
        self.current_value = 0.0;
        self.status = PositionStatus::Closed;
    }
}

/// Memecoin (sniper) limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemecoinConfig {
    /// Per-entry cap in base units
    pub max_investment: f64,
    /// Full exit once PnL reaches this percentage
    pub profit_target_percent: f64,
    pub max_age_hours: f64,
    /// Timeout exit applies only below this PnL percentage
    pub timeout_min_pnl_percent: f64,
}

impl Default for MemecoinConfig {
    fn default() -> Self {
        Self {
            max_investment: 0.008,
            profit_target_percent: 200.0,
            max_age_hours: 24.0,
            timeout_min_pnl_percent: 50.0,
        }
    }
}

/// Altcoin (swing) limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AltcoinConfig {
    pub size_multiplier: f64,
    pub max_age_hours: f64,
    pub timeout_min_pnl_percent: f64,
}

impl Default for AltcoinConfig {
    fn default() -> Self {
        Self {
            size_multiplier: 2.0,
            max_age_hours: 168.0,
            timeout_min_pnl_percent: 20.0,
        }
    }
}

/// Exit rules and sizing for open positions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub take_profit_levels: Vec<f64>,
    pub stop_loss: f64,
    pub trailing_stop: f64,
    /// Share of the current holding sold per ladder level
    pub partial_exit_fraction: f64,
    pub tick_interval_secs: u64,
    pub max_positions: usize,
    /// Wait after the first failed exit of a position; doubles per failure
    pub exit_retry_secs: u64,
    pub max_exit_retry_secs: u64,
    /// Base entry size in base units
    pub trade_size: f64,
    pub memecoin: MemecoinConfig,
    pub altcoin: AltcoinConfig,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            take_profit_levels: vec![0.25, 0.5, 1.0, 2.0],
            stop_loss: 0.15,
            trailing_stop: 0.12,
            partial_exit_fraction: 0.25,
            tick_interval_secs: 5,
            max_positions: 3,
            exit_retry_secs: 30,
            max_exit_retry_secs: 600,
            trade_size: 0.001,
            memecoin: MemecoinConfig::default(),
            altcoin: AltcoinConfig::default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::shared::types::U256;
    use std::time::Duration;

    pub(crate) fn token_info() -> TokenInfo {
        TokenInfo {
            address: Address::repeat_byte(0x01),
            symbol: "PEPE".to_string(),
            name: None,
            decimals: 18,
            total_supply: U256::from(1_000_000_000_000_000_000_000_000u128),
        }
    }

    /// 0.001 ETH buying 0.001 tokens puts entry at exactly 1.0
    pub(crate) fn buy_result() -> TradeResult {
        TradeResult {
            success: true,
            tx_hash: Some("0xabc".to_string()),
            amount_in: 1_000_000_000_000_000,
            amount_out: 1_000_000_000_000_000,
            min_amount_out: 0,
            gas_used: 0,
            gas_price: 0,
            total_cost: 0,
            execution_time: Duration::ZERO,
            venue: Some("uniswap_v2".to_string()),
            error: None,
        }
    }

    #[test]
    fn test_open_derives_entry_and_stop() {
        let p = Position::open(&token_info(), Strategy::Memecoin, &buy_result(), &PositionConfig::default(), Utc::now())
            .unwrap();
        assert!((p.entry_price - 1.0).abs() < 1e-12);
        assert!((p.stop_loss_price - 0.85).abs() < 1e-12);
        assert_eq!(p.trailing_stop_price, 0.0);
        assert_eq!(p.status, PositionStatus::Active);
        assert_eq!(p.take_profit_levels, vec![0.25, 0.5, 1.0, 2.0]);
        assert_eq!(p.entry_tx_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_open_rejects_failed_or_empty_buy() {
        let mut failed = buy_result();
        failed.success = false;
        assert!(Position::open(&token_info(), Strategy::Altcoin, &failed, &PositionConfig::default(), Utc::now()).is_err());

        let mut empty = buy_result();
        empty.amount_out = 0;
        assert!(Position::open(&token_info(), Strategy::Altcoin, &empty, &PositionConfig::default(), Utc::now()).is_err());
    }

    #[test]
    fn test_partial_exit_releases_proportional_basis() {
        let mut p =
            Position::open(&token_info(), Strategy::Memecoin, &buy_result(), &PositionConfig::default(), Utc::now())
                .unwrap();
        let released = p.apply_partial_exit(0.25, 250_000_000_000_000, 0.0001);
        assert!((released - 0.00025).abs() < 1e-15);
        assert_eq!(p.amount_raw, 750_000_000_000_000);
        assert!((p.cost_basis - 0.00075).abs() < 1e-15);
        assert_eq!(p.take_profit_levels, vec![0.5, 1.0, 2.0]);
        assert_eq!(p.status, PositionStatus::TakingProfit);
        assert!(p.is_open());
    }

    #[test]
    fn test_position_json_roundtrip() {
        let mut p =
            Position::open(&token_info(), Strategy::Altcoin, &buy_result(), &PositionConfig::default(), Utc::now())
                .unwrap();
        p.current_price = 1.234_567_891_234;
        p.trailing_stop_price = 1.086_419_744;
        p.apply_partial_exit(0.25, 123_456_789, 0.000_012_3);

        let json = serde_json::to_string(&p).unwrap();
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("memecoin".parse::<Strategy>().unwrap(), Strategy::Memecoin);
        assert_eq!("Swing".parse::<Strategy>().unwrap(), Strategy::Altcoin);
        assert!("index".parse::<Strategy>().is_err());
        assert_eq!(ExitReason::StopLoss.to_string(), "Stop Loss");
    }
}
