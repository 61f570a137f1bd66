//! Error handling for the application

use thiserror::Error;

/// Trade-level errors, surfaced in `TradeResult` and through the retry wrapper
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("No venue produced a usable quote")]
    QuoteUnavailable,

    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("Slippage exceeded: expected at least {expected_min}, got {actual}")]
    SlippageExceeded { expected_min: u128, actual: u128 },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u128, available: u128 },

    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),

    #[error("Transaction {0} not confirmed in time")]
    ConfirmationTimeout(String),

    #[error("Blocked by risk gate: {0}")]
    RiskBlocked(String),

    #[error("Transient network error: {0}")]
    TransientNetworkError(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("ABI error: {0}")]
    Abi(String),
}

impl TradeError {
    /// Only network hiccups and empty quote sets are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradeError::TransientNetworkError(_) | TradeError::QuoteUnavailable
        )
    }

    /// Short machine-friendly name, used in logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            TradeError::QuoteUnavailable => "quote_unavailable",
            TradeError::InsufficientLiquidity(_) => "insufficient_liquidity",
            TradeError::SlippageExceeded { .. } => "slippage_exceeded",
            TradeError::InsufficientBalance { .. } => "insufficient_balance",
            TradeError::TransactionReverted(_) => "transaction_reverted",
            TradeError::ConfirmationTimeout(_) => "confirmation_timeout",
            TradeError::RiskBlocked(_) => "risk_blocked",
            TradeError::TransientNetworkError(_) => "transient_network",
            TradeError::Rpc { .. } => "rpc",
            TradeError::Abi(_) => "abi",
        }
    }
}

/// Errors raised by chain adapters (JSON-RPC, signer)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<ChainError> for TradeError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Transport(msg) => TradeError::TransientNetworkError(msg),
            ChainError::Timeout(msg) => TradeError::TransientNetworkError(format!("timeout: {}", msg)),
            ChainError::Reverted(msg) => TradeError::TransactionReverted(msg),
            ChainError::Rpc { code, message } => TradeError::Rpc { code, message },
            ChainError::Decode(msg) => TradeError::Abi(msg),
        }
    }
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Blockchain error: {0}")]
    BlockchainError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Position already open for token {0}")]
    PositionExists(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<TradeError> for AppError {
    fn from(err: TradeError) -> Self {
        AppError::ExecutionError(err.to_string())
    }
}

impl From<ChainError> for AppError {
    fn from(err: ChainError) -> Self {
        AppError::BlockchainError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::StorageError(format!("Serialization failed: {}", err))
    }
}
