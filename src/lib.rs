//! dexsniper - EVM DEX sniper
//! Built with Domain-Driven Design principles

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use domain::execution::SafeTradeExecutor;
pub use domain::position::PositionLedger;
pub use domain::quote::QuoteAggregator;
pub use domain::risk::RiskGate;
pub use infrastructure::blockchain::TradeExecutor;
