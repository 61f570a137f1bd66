//! Execution domain - trade contracts, pricing, nonce sequencing and retries

pub mod nonce;
pub mod pricing;
pub mod retry;
pub mod safe_executor;

pub use nonce::NonceManager;
pub use pricing::{GasPolicy, SlippagePolicy};
pub use retry::{Backoff, RetryPolicy};
pub use safe_executor::SafeTradeExecutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::errors::TradeError;
use crate::shared::types::Address;
use crate::shared::utils::wei_to_eth;

/// Trade execution request
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub token_in: Address,
    pub token_out: Address,
    /// Raw input amount (wei when paying native ETH)
    pub amount_in: u128,
    pub is_buy: bool,
    /// Caller-imposed slippage tolerance, replaces the dynamic one
    pub max_slippage: Option<f64>,
    pub deadline_secs: u64,
}

impl TradeRequest {
    pub fn buy(weth: Address, token: Address, amount_in: u128) -> Self {
        Self {
            token_in: weth,
            token_out: token,
            amount_in,
            is_buy: true,
            max_slippage: None,
            deadline_secs: 300,
        }
    }

    pub fn sell(token: Address, weth: Address, amount_in: u128) -> Self {
        Self {
            token_in: token,
            token_out: weth,
            amount_in,
            is_buy: false,
            max_slippage: None,
            deadline_secs: 300,
        }
    }

    /// The non-base side of the trade
    pub fn token(&self) -> Address {
        if self.is_buy {
            self.token_out
        } else {
            self.token_in
        }
    }
}

/// Trade execution result
#[derive(Debug, Clone, PartialEq)]
pub struct TradeResult {
    pub success: bool,
    /// Set whenever a transaction was broadcast, including failed ones
    pub tx_hash: Option<String>,
    pub amount_in: u128,
    pub amount_out: u128,
    pub min_amount_out: u128,
    pub gas_used: u64,
    pub gas_price: u128,
    /// `gas_used * gas_price` in wei
    pub total_cost: u128,
    pub execution_time: Duration,
    pub venue: Option<String>,
    /// Set on failure, or `SlippageExceeded` on an otherwise successful trade
    pub error: Option<TradeError>,
}

impl TradeResult {
    pub fn failed(amount_in: u128, error: TradeError, execution_time: Duration) -> Self {
        Self {
            success: false,
            tx_hash: None,
            amount_in,
            amount_out: 0,
            min_amount_out: 0,
            gas_used: 0,
            gas_price: 0,
            total_cost: 0,
            execution_time,
            venue: None,
            error: Some(error),
        }
    }

    /// Never true once a transaction was broadcast, so a trade is not sent twice
    pub fn is_retryable(&self) -> bool {
        !self.success && self.tx_hash.is_none() && self.error.as_ref().map(TradeError::is_retryable).unwrap_or(false)
    }

    /// A transaction for this trade was broadcast (or simulated in a dry run)
    pub fn reached_chain(&self) -> bool {
        self.success || self.tx_hash.is_some()
    }

    pub fn gas_cost_eth(&self) -> f64 {
        wei_to_eth(self.total_cost)
    }

    pub fn slippage_exceeded(&self) -> bool {
        matches!(self.error, Some(TradeError::SlippageExceeded { .. }))
    }

    /// Net result of a sale in base units: proceeds minus the cost basis sold and gas
    pub fn sale_pnl(&self, cost_basis: f64) -> f64 {
        wei_to_eth(self.amount_out) - cost_basis - self.gas_cost_eth()
    }
}

/// Something that can carry out a single trade attempt
#[async_trait]
pub trait TradeExecution: Send + Sync {
    async fn execute(&self, request: &TradeRequest) -> TradeResult;
}

/// Gas, slippage, nonce and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub base_slippage: f64,
    pub max_slippage: f64,
    pub base_gas_price_gwei: f64,
    pub max_gas_price_gwei: f64,
    pub priority_premium_bps: u32,
    pub gas_limit_multiplier: f64,
    pub deadline_secs: u64,
    pub receipt_timeout_secs: u64,
    pub nonce_ttl_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub dry_run: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            base_slippage: 0.005,
            max_slippage: 0.15,
            base_gas_price_gwei: 1.0,
            max_gas_price_gwei: 50.0,
            priority_premium_bps: 1000,
            gas_limit_multiplier: 1.1,
            deadline_secs: 300,
            receipt_timeout_secs: 300,
            nonce_ttl_secs: 30,
            max_retries: 3,
            retry_delay_ms: 1000,
            dry_run: false,
        }
    }
}

impl ExecutionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }
}
