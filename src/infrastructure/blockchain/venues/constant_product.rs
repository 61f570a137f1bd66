//! Constant-product (Uniswap V2 style) router quotes

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::domain::chain::ChainClient;
use crate::domain::quote::{Quote, QuoteRequest, VenueKind, VenueQuoteClient};
use crate::infrastructure::blockchain::contracts::{self, IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router};
use crate::shared::errors::TradeError;
use crate::shared::types::{Address, U256};
use crate::shared::utils::wei_to_eth;

use super::relative_impact;

const BASE_SWAP_GAS: u64 = 150_000;
const EXTRA_HOP_GAS: u64 = 50_000;
/// Assumed when the pair's reserves cannot be read
const UNKNOWN_IMPACT: f64 = 0.5;
/// Assumed depth of a pair with no WETH side
const NON_WETH_LIQUIDITY: f64 = 1.0;
const SLIPPAGE_BUFFER: f64 = 1.5;

pub struct ConstantProductVenue {
    name: String,
    router: Address,
    factory: Address,
    weth: Address,
    max_slippage: f64,
    chain: Arc<dyn ChainClient>,
}

impl ConstantProductVenue {
    pub fn new(
        name: &str,
        router: Address,
        factory: Address,
        weth: Address,
        max_slippage: f64,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        Self {
            name: name.to_string(),
            router,
            factory,
            weth,
            max_slippage,
            chain,
        }
    }

    async fn amount_out(&self, path: Vec<Address>, amount_in: u128) -> Result<u128, TradeError> {
        let call = IUniswapV2Router::getAmountsOutCall {
            amountIn: U256::from(amount_in),
            path,
        };
        let amounts = contracts::read(self.chain.as_ref(), self.router, &call).await?;
        let last = amounts.last().copied().ok_or(TradeError::QuoteUnavailable)?;
        Ok(contracts::raw_amount(last, "getAmountsOut")?)
    }

    /// Reserves oriented as (reserve_in, reserve_out), `None` when no pair exists
    async fn reserves(&self, token_in: Address, token_out: Address) -> Result<Option<(u128, u128)>, TradeError> {
        let chain = self.chain.as_ref();
        let get_pair = IUniswapV2Factory::getPairCall {
            tokenA: token_in,
            tokenB: token_out,
        };
        let pair = contracts::read(chain, self.factory, &get_pair).await?;
        if pair.is_zero() {
            return Ok(None);
        }

        let (reserves, token0) = tokio::join!(
            contracts::read(chain, pair, &IUniswapV2Pair::getReservesCall {}),
            contracts::read(chain, pair, &IUniswapV2Pair::token0Call {}),
        );
        let reserves = reserves?;
        // uint112 always fits
        let r0 = reserves.reserve0.to::<u128>();
        let r1 = reserves.reserve1.to::<u128>();
        let token0 = token0?;

        Ok(Some(if token0 == token_in { (r0, r1) } else { (r1, r0) }))
    }

    fn liquidity(&self, request: &QuoteRequest, reserve_in: u128, reserve_out: u128) -> f64 {
        if request.token_in == self.weth {
            wei_to_eth(reserve_in)
        } else if request.token_out == self.weth {
            wei_to_eth(reserve_out)
        } else {
            NON_WETH_LIQUIDITY
        }
    }
}

/// Mid-price movement caused by taking `amount_out` for `amount_in`
pub fn price_impact(reserve_in: u128, reserve_out: u128, amount_in: u128, amount_out: u128) -> Option<f64> {
    if reserve_in == 0 || reserve_out == 0 {
        return None;
    }
    let before = reserve_out as f64 / reserve_in as f64;
    let after = reserve_out.saturating_sub(amount_out) as f64 / reserve_in.saturating_add(amount_in) as f64;
    relative_impact(before, after)
}

pub fn gas_estimate(hops: usize) -> u64 {
    BASE_SWAP_GAS + EXTRA_HOP_GAS * hops.saturating_sub(1) as u64
}

#[async_trait]
impl VenueQuoteClient for ConstantProductVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> VenueKind {
        VenueKind::ConstantProduct
    }

    fn router(&self) -> Address {
        self.router
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, TradeError> {
        let path = vec![request.token_in, request.token_out];
        let hops = path.len() - 1;

        let (amount_out, reserves) = tokio::join!(
            self.amount_out(path, request.amount_in),
            self.reserves(request.token_in, request.token_out),
        );
        let amount_out = amount_out?;
        if amount_out == 0 {
            return Err(TradeError::InsufficientLiquidity(format!("{} returned zero output", self.name)));
        }

        let reserves = reserves.unwrap_or_else(|e| {
            debug!("🔍 {} reserves unavailable: {}", self.name, e);
            None
        });
        let (price_impact, liquidity) = match reserves {
            Some((reserve_in, reserve_out)) => (
                price_impact(reserve_in, reserve_out, request.amount_in, amount_out).unwrap_or(UNKNOWN_IMPACT),
                self.liquidity(request, reserve_in, reserve_out),
            ),
            None => (UNKNOWN_IMPACT, 0.0),
        };

        Ok(Quote {
            venue: self.name.clone(),
            kind: VenueKind::ConstantProduct,
            router: self.router,
            amount_out,
            price_impact,
            gas_estimate: gas_estimate(hops),
            slippage: (price_impact * SLIPPAGE_BUFFER).min(self.max_slippage),
            liquidity,
            available: true,
            fee_tier: None,
            error: None,
        })
    }
}
