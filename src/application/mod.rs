//! Application layer - wiring, entry pipeline, background loops and CLI

pub mod bootstrap;
pub mod commands;
pub mod monitor;
pub mod pipeline;

pub use bootstrap::TradingContext;
pub use commands::{Cli, CommandExecutor, Commands};
pub use pipeline::{EntryOutcome, EntryPipeline};
