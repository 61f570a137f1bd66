//! Utility functions and helpers

use crate::shared::types::BASE_DECIMALS;

pub const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Format a raw amount with its decimals
pub fn format_units(amount: u128, decimals: u8) -> String {
    format!("{:.6}", to_units(amount, decimals))
}

/// Raw integer amount to human units
pub fn to_units(amount: u128, decimals: u8) -> f64 {
    amount as f64 / 10_f64.powi(decimals as i32)
}

/// Human units to raw integer amount, truncating
pub fn from_units(units: f64, decimals: u8) -> u128 {
    if !units.is_finite() || units <= 0.0 {
        return 0;
    }
    (units * 10_f64.powi(decimals as i32)) as u128
}

pub fn wei_to_eth(wei: u128) -> f64 {
    to_units(wei, BASE_DECIMALS)
}

pub fn eth_to_wei(eth: f64) -> u128 {
    from_units(eth, BASE_DECIMALS)
}

pub fn gwei_to_wei(gwei: f64) -> u128 {
    if gwei <= 0.0 {
        return 0;
    }
    (gwei * WEI_PER_GWEI as f64) as u128
}

/// Scale a raw amount by a float factor, saturating at zero
pub fn scale_amount(amount: u128, factor: f64) -> u128 {
    if factor <= 0.0 || !factor.is_finite() {
        return 0;
    }
    (amount as f64 * factor) as u128
}

/// Calculate percentage change
pub fn calculate_percentage_change(old_value: f64, new_value: f64) -> f64 {
    if old_value > 0.0 {
        ((new_value - old_value) / old_value) * 100.0
    } else {
        0.0
    }
}

/// Generate unique ID
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
