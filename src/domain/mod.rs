//! Domain layer - core trading logic and ports

pub mod chain;
pub mod external;
pub mod persistence;
pub mod quote;
pub mod risk;
pub mod execution;
pub mod position;
pub mod portfolio;
