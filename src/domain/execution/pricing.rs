//! Slippage and gas pricing policies

use crate::domain::quote::Quote;
use crate::shared::utils::{gwei_to_wei, scale_amount};

use super::ExecutionConfig;

/// Allowed slippage: the base tolerance widened by price impact and thin liquidity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlippagePolicy {
    pub base: f64,
    pub max: f64,
}

impl SlippagePolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            base: config.base_slippage,
            max: config.max_slippage,
        }
    }

    /// Liquidity below one base unit widens the tolerance, below half a unit doubles it
    fn liquidity_multiplier(liquidity: f64) -> f64 {
        if liquidity < 0.5 {
            2.0
        } else if liquidity < 1.0 {
            1.5
        } else {
            1.0
        }
    }

    pub fn dynamic(&self, price_impact: f64, liquidity: f64) -> f64 {
        let widened = self.base * (1.0 + 2.0 * price_impact.max(0.0)) * Self::liquidity_multiplier(liquidity);
        widened.min(self.max)
    }

    /// Slippage used for `quote`; an explicit caller tolerance wins
    pub fn effective(&self, quote: &Quote, caller_max: Option<f64>) -> f64 {
        match caller_max {
            Some(explicit) => explicit.clamp(0.0, self.max),
            None => self.base.max(self.dynamic(quote.price_impact, quote.liquidity)),
        }
    }

    pub fn min_amount_out(quoted: u128, slippage: f64) -> u128 {
        scale_amount(quoted, 1.0 - slippage.clamp(0.0, 1.0))
    }
}

/// Network price plus a premium, clamped to configured bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasPolicy {
    pub base_price: u128,
    pub max_price: u128,
    pub premium_bps: u32,
    pub limit_multiplier: f64,
}

impl GasPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            base_price: gwei_to_wei(config.base_gas_price_gwei),
            max_price: gwei_to_wei(config.max_gas_price_gwei),
            premium_bps: config.priority_premium_bps,
            limit_multiplier: config.gas_limit_multiplier,
        }
    }

    pub fn price(&self, network: u128) -> u128 {
        let with_premium = network.saturating_mul(10_000 + self.premium_bps as u128) / 10_000;
        with_premium.clamp(self.base_price, self.max_price.max(self.base_price))
    }

    pub fn limit(&self, estimate: u64) -> u64 {
        (estimate as f64 * self.limit_multiplier.max(1.0)) as u64
    }
}
