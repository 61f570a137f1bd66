//! Concentrated-liquidity (Uniswap V3 style) quotes through QuoterV2

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

use crate::domain::chain::ChainClient;
use crate::domain::quote::{Quote, QuoteRequest, VenueKind, VenueQuoteClient};
use alloy::primitives::aliases::{U160, U24};

use crate::infrastructure::blockchain::contracts::{self, IQuoterV2, IUniswapV3Factory, IERC20};
use crate::shared::errors::TradeError;
use crate::shared::types::{Address, U256};
use crate::shared::utils::wei_to_eth;

use super::relative_impact;

pub const DEFAULT_FEE_TIERS: [u32; 3] = [500, 3000, 10_000];
const FALLBACK_GAS: u64 = 200_000;
/// Assumed when no spot price can be read
const UNKNOWN_IMPACT: f64 = 0.3;
const SLIPPAGE_BUFFER: f64 = 1.2;
/// Spot quote size relative to the trade, never below `MIN_SPOT_SIZE`
const SPOT_DIVISOR: u128 = 1_000;
const MIN_SPOT_SIZE: u128 = 1_000;

/// One fee tier's answer
#[derive(Debug, Clone, Copy, PartialEq)]
struct TierQuote {
    fee: u32,
    amount_out: u128,
    gas_estimate: u64,
}

pub struct ConcentratedLiquidityVenue {
    name: String,
    router: Address,
    factory: Address,
    quoter: Address,
    weth: Address,
    max_slippage: f64,
    fee_tiers: Vec<u32>,
    chain: Arc<dyn ChainClient>,
}

impl ConcentratedLiquidityVenue {
    pub fn new(
        name: &str,
        router: Address,
        factory: Address,
        quoter: Address,
        weth: Address,
        max_slippage: f64,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        Self {
            name: name.to_string(),
            router,
            factory,
            quoter,
            weth,
            max_slippage,
            fee_tiers: DEFAULT_FEE_TIERS.to_vec(),
            chain,
        }
    }

    pub fn with_fee_tiers(mut self, fee_tiers: Vec<u32>) -> Self {
        self.fee_tiers = fee_tiers;
        self
    }

    async fn quote_tier(&self, request: &QuoteRequest, amount_in: u128, fee: u32) -> Result<TierQuote, TradeError> {
        let call = IQuoterV2::quoteExactInputSingleCall {
            params: IQuoterV2::QuoteExactInputSingleParams {
                tokenIn: request.token_in,
                tokenOut: request.token_out,
                amountIn: U256::from(amount_in),
                fee: fee_tier(fee)?,
                sqrtPriceLimitX96: U160::ZERO,
            },
        };
        let answer = contracts::read(self.chain.as_ref(), self.quoter, &call).await?;
        Ok(TierQuote {
            fee,
            amount_out: contracts::raw_amount(answer.amountOut, "quoteExactInputSingle")?,
            gas_estimate: u64::try_from(answer.gasEstimate).unwrap_or(0),
        })
    }

    async fn best_tier(&self, request: &QuoteRequest) -> Option<TierQuote> {
        let calls = self
            .fee_tiers
            .iter()
            .map(|fee| self.quote_tier(request, request.amount_in, *fee));
        join_all(calls)
            .await
            .into_iter()
            .filter_map(|r| match r {
                Ok(q) if q.amount_out > 0 => Some(q),
                Ok(_) => None,
                Err(e) => {
                    debug!("🔍 {} tier quote failed: {}", self.name, e);
                    None
                }
            })
            .max_by_key(|q| q.amount_out)
    }

    /// Impact against a small spot quote in the same pool
    async fn price_impact(&self, request: &QuoteRequest, best: &TierQuote) -> f64 {
        let size = (request.amount_in / SPOT_DIVISOR).max(MIN_SPOT_SIZE);
        match self.quote_tier(request, size, best.fee).await {
            Ok(spot) if spot.amount_out > 0 => {
                let spot_price = spot.amount_out as f64 / size as f64;
                let effective = best.amount_out as f64 / request.amount_in as f64;
                relative_impact(spot_price, effective).unwrap_or(UNKNOWN_IMPACT)
            }
            _ => UNKNOWN_IMPACT,
        }
    }

    /// WETH held by the pool, in base units
    async fn liquidity(&self, request: &QuoteRequest, fee: u32) -> Result<f64, TradeError> {
        let get_pool = IUniswapV3Factory::getPoolCall {
            tokenA: request.token_in,
            tokenB: request.token_out,
            fee: fee_tier(fee)?,
        };
        let pool = contracts::read(self.chain.as_ref(), self.factory, &get_pool).await?;
        if pool.is_zero() {
            return Ok(0.0);
        }
        let balance = contracts::read(self.chain.as_ref(), self.weth, &IERC20::balanceOfCall { account: pool }).await?;
        Ok(wei_to_eth(contracts::raw_amount(balance, "balanceOf")?))
    }
}

fn fee_tier(fee: u32) -> Result<U24, TradeError> {
    U24::try_from(fee).map_err(|_| TradeError::Abi(format!("fee tier {} does not fit uint24", fee)))
}

#[async_trait]
impl VenueQuoteClient for ConcentratedLiquidityVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> VenueKind {
        VenueKind::ConcentratedLiquidity
    }

    fn router(&self) -> Address {
        self.router
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, TradeError> {
        if request.amount_in == 0 {
            return Err(TradeError::QuoteUnavailable);
        }
        let best = self.best_tier(request).await.ok_or(TradeError::QuoteUnavailable)?;

        let (price_impact, liquidity) = tokio::join!(self.price_impact(request, &best), self.liquidity(request, best.fee));
        let liquidity = liquidity.unwrap_or_else(|e| {
            debug!("🔍 {} pool liquidity unavailable: {}", self.name, e);
            0.0
        });

        Ok(Quote {
            venue: self.name.clone(),
            kind: VenueKind::ConcentratedLiquidity,
            router: self.router,
            amount_out: best.amount_out,
            price_impact,
            gas_estimate: if best.gas_estimate > 0 { best.gas_estimate } else { FALLBACK_GAS },
            slippage: (price_impact * SLIPPAGE_BUFFER).min(self.max_slippage),
            liquidity,
            available: true,
            fee_tier: Some(best.fee),
            error: None,
        })
    }
}
