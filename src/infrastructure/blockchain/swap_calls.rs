//! Router calldata for swaps and ERC-20 approvals

use alloy::primitives::aliases::{U160, U24};
use alloy::sol_types::SolCall;

use crate::domain::execution::TradeRequest;
use crate::domain::quote::{Quote, VenueKind};
use crate::shared::errors::TradeError;
use crate::shared::types::{Address, Bytes, U256};

use super::contracts::{ISwapRouter02, IUniswapV2Router, IERC20};

/// Target, calldata and attached value of one router call
#[derive(Debug, Clone, PartialEq)]
pub struct SwapCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// How the trade's output reaches the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// ERC-20 transferred to the recipient
    Token(Address),
    /// WETH unwrapped by the router and paid out natively
    Native,
}

impl SwapCall {
    pub fn output_kind(quote: &Quote, request: &TradeRequest, weth: Address) -> OutputKind {
        let native_out =
            quote.kind == VenueKind::ConstantProduct && !request.is_buy && request.token_out == weth;
        if native_out {
            OutputKind::Native
        } else {
            OutputKind::Token(request.token_out)
        }
    }
}

/// Build the router call for `request` on the venue that produced `quote`
pub fn build_swap(
    quote: &Quote,
    request: &TradeRequest,
    min_amount_out: u128,
    recipient: Address,
    weth: Address,
    deadline: u64,
) -> Result<SwapCall, TradeError> {
    let pays_native = request.is_buy && request.token_in == weth;
    let amount_in = U256::from(request.amount_in);
    let min_out = U256::from(min_amount_out);

    match quote.kind {
        VenueKind::ConstantProduct => {
            let path = vec![request.token_in, request.token_out];
            let deadline = U256::from(deadline);
            let (data, value) = if pays_native {
                let call = IUniswapV2Router::swapExactETHForTokensCall {
                    amountOutMin: min_out,
                    path,
                    to: recipient,
                    deadline,
                };
                (call.abi_encode(), amount_in)
            } else if request.token_out == weth {
                let call = IUniswapV2Router::swapExactTokensForETHCall {
                    amountIn: amount_in,
                    amountOutMin: min_out,
                    path,
                    to: recipient,
                    deadline,
                };
                (call.abi_encode(), U256::ZERO)
            } else {
                let call = IUniswapV2Router::swapExactTokensForTokensCall {
                    amountIn: amount_in,
                    amountOutMin: min_out,
                    path,
                    to: recipient,
                    deadline,
                };
                (call.abi_encode(), U256::ZERO)
            };
            Ok(SwapCall {
                to: quote.router,
                data: data.into(),
                value,
            })
        }
        VenueKind::ConcentratedLiquidity => {
            let fee = quote
                .fee_tier
                .ok_or_else(|| TradeError::Abi(format!("{} quote carries no fee tier", quote.venue)))?;
            let fee = U24::try_from(fee).map_err(|_| TradeError::Abi(format!("fee tier {} does not fit uint24", fee)))?;
            let call = ISwapRouter02::exactInputSingleCall {
                params: ISwapRouter02::ExactInputSingleParams {
                    tokenIn: request.token_in,
                    tokenOut: request.token_out,
                    fee,
                    recipient,
                    amountIn: amount_in,
                    amountOutMinimum: min_out,
                    sqrtPriceLimitX96: U160::ZERO,
                },
            };
            Ok(SwapCall {
                to: quote.router,
                data: call.abi_encode().into(),
                value: if pays_native { amount_in } else { U256::ZERO },
            })
        }
    }
}

pub fn allowance_call(owner: Address, spender: Address) -> Vec<u8> {
    IERC20::allowanceCall { owner, spender }.abi_encode()
}

/// Unlimited approval for `spender`
pub fn approve_max_call(spender: Address) -> Vec<u8> {
    IERC20::approveCall {
        spender,
        amount: U256::MAX,
    }
    .abi_encode()
}
