//! On-chain venue adapters (Uniswap V2 and V3 style)

pub mod concentrated_liquidity;
pub mod constant_product;
pub mod factory;

pub use concentrated_liquidity::ConcentratedLiquidityVenue;
pub use constant_product::ConstantProductVenue;
pub use factory::VenueFactory;

/// Relative distance between two prices, capped at 1
fn relative_impact(reference: f64, observed: f64) -> Option<f64> {
    if reference <= 0.0 || !reference.is_finite() || !observed.is_finite() {
        return None;
    }
    Some(((reference - observed).abs() / reference).min(1.0))
}
