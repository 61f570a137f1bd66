//! Solidity bindings for the routers, quoters, pools and ERC-20 calls we make

use alloy::primitives::Log;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};

use crate::domain::chain::{CallRequest, ChainClient};
use crate::shared::errors::ChainError;
use crate::shared::types::{Address, U256};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
        function totalSupply() external view returns (uint256);
    }

    /// Pre-2018 tokens returning `bytes32` metadata
    #[derive(Debug, PartialEq, Eq)]
    interface IERC20Bytes32 {
        function symbol() external view returns (bytes32);
        function name() external view returns (bytes32);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IWETH9 {
        event Withdrawal(address indexed src, uint256 wad);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IUniswapV2Router {
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
        function swapExactETHForTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
        function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IUniswapV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params) external returns (uint256 amountOut, uint160 sqrtPriceX96After, uint32 initializedTicksCrossed, uint256 gasEstimate);
    }

    /// SwapRouter02 drops the deadline from the params struct
    #[derive(Debug, PartialEq, Eq)]
    interface ISwapRouter02 {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }
}

/// `eth_call` `call` against `to` and decode its return values
pub async fn read<C: SolCall>(chain: &dyn ChainClient, to: Address, call: &C) -> Result<C::Return, ChainError> {
    let raw = chain.call(&CallRequest::new(to, call.abi_encode())).await?;
    C::abi_decode_returns(&raw).map_err(|e| ChainError::Decode(format!("{}: {}", C::SIGNATURE, e)))
}

/// Narrow an on-chain amount to the raw width the domain trades in; never clamps
pub fn raw_amount(value: U256, what: &str) -> Result<u128, ChainError> {
    u128::try_from(value).map_err(|_| ChainError::Decode(format!("{} {} exceeds 128 bits", what, value)))
}

fn sum(amounts: impl Iterator<Item = U256>) -> Option<U256> {
    amounts.fold(None, |acc, v| Some(acc.unwrap_or(U256::ZERO).saturating_add(v)))
}

/// Sum of `token` transfers received by `recipient`
pub fn transfers_to(logs: &[Log], token: Address, recipient: Address) -> Option<U256> {
    sum(logs
        .iter()
        .filter(|log| log.address == token)
        .filter_map(|log| IERC20::Transfer::decode_log_data(&log.data).ok())
        .filter(|transfer| transfer.to == recipient)
        .map(|transfer| transfer.value))
}

/// Sum of WETH unwrapped, i.e. native ETH paid out by a router
pub fn weth_withdrawals(logs: &[Log], weth: Address) -> Option<U256> {
    sum(logs
        .iter()
        .filter(|log| log.address == weth)
        .filter_map(|log| IWETH9::Withdrawal::decode_log_data(&log.data).ok())
        .map(|withdrawal| withdrawal.wad))
}

/// Log as the node would return it for `event` emitted by `address`
#[cfg(test)]
pub fn emitted<E: SolEvent>(address: Address, event: &E) -> Log {
    Log {
        address,
        data: event.encode_log_data(),
    }
}
