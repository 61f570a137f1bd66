use std::sync::Arc;
use std::time::Duration;

use super::{ConcentratedLiquidityVenue, ConstantProductVenue};
use crate::domain::chain::ChainClient;
use crate::domain::quote::{AggregatorConfig, VenueHandle, VenueKind, VenueQuoteClient};
use crate::shared::config::VenueConfig;
use crate::shared::errors::AppError;
use crate::shared::types::Address;

/// Factory for building venue quote clients from configuration
pub struct VenueFactory {
    chain: Arc<dyn ChainClient>,
    weth: Address,
    max_slippage: f64,
}

impl VenueFactory {
    pub fn new(chain: Arc<dyn ChainClient>, weth: Address, aggregator: &AggregatorConfig) -> Self {
        Self {
            chain,
            weth,
            max_slippage: aggregator.max_slippage,
        }
    }

    /// Create the quote client for one configured venue
    pub fn create(&self, venue: &VenueConfig) -> Result<VenueHandle, AppError> {
        let client: Arc<dyn VenueQuoteClient> = match venue.kind {
            VenueKind::ConstantProduct => Arc::new(ConstantProductVenue::new(
                &venue.name,
                venue.router,
                venue.factory,
                self.weth,
                self.max_slippage,
                Arc::clone(&self.chain),
            )),
            VenueKind::ConcentratedLiquidity => {
                let quoter = venue.quoter.ok_or_else(|| {
                    AppError::ConfigError(format!("venue {} is v3 but has no quoter address", venue.name))
                })?;
                Arc::new(ConcentratedLiquidityVenue::new(
                    &venue.name,
                    venue.router,
                    venue.factory,
                    quoter,
                    self.weth,
                    self.max_slippage,
                    Arc::clone(&self.chain),
                ))
            }
        };

        Ok(VenueHandle {
            client,
            timeout: Duration::from_millis(venue.timeout_ms),
        })
    }

    /// Create every configured venue; venue names must be unique
    pub fn create_all(&self, venues: &[VenueConfig]) -> Result<Vec<VenueHandle>, AppError> {
        let mut handles = Vec::with_capacity(venues.len());
        for (i, venue) in venues.iter().enumerate() {
            if venues[..i].iter().any(|v| v.name == venue.name) {
                return Err(AppError::ConfigError(format!("duplicate venue name {}", venue.name)));
            }
            handles.push(self.create(venue)?);
        }
        Ok(handles)
    }
}
