//! EVM node access: alloy provider, local signer, contract bindings, venues and the trade executor

pub mod contracts;
pub mod rpc_client;
pub mod signer;
pub mod swap_calls;
pub mod token_metadata;
pub mod trade_executor;
pub mod venues;

pub use rpc_client::RpcChainClient;
pub use signer::{LocalKeySigner, WatchOnlySigner};
pub use token_metadata::Erc20MetadataProvider;
pub use trade_executor::TradeExecutor;
pub use venues::{ConcentratedLiquidityVenue, ConstantProductVenue, VenueFactory};
