//! Common types used across the application

pub use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimals of the native base asset (ETH / WETH)
pub const BASE_DECIMALS: u8 = 18;

/// Log-friendly address rendering
pub trait AddressExt {
    /// Short form for log lines: `0x1234…abcd`
    fn short(&self) -> String;
}

impl AddressExt for Address {
    fn short(&self) -> String {
        let full = format!("{:#x}", self);
        format!("{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

/// Trade side as seen by the risk gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
        }
    }

    pub fn from_is_buy(is_buy: bool) -> Self {
        if is_buy {
            TradeDirection::Buy
        } else {
            TradeDirection::Sell
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token metadata, used for display and sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: u8,
    pub total_supply: U256,
}
