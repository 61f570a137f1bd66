//! ERC-20 metadata reader (`symbol`, `name`, `decimals`, `totalSupply`)

use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::chain::{CallRequest, ChainClient};
use crate::domain::external::TokenMetadataProvider;
use crate::shared::errors::{AppError, ChainError};
use crate::shared::types::{Address, AddressExt, Bytes, TokenInfo, U256};

use super::contracts::{self, IERC20Bytes32, IERC20};

/// Reads token metadata over `eth_call`, caching each token after the first read
pub struct Erc20MetadataProvider {
    chain: Arc<dyn ChainClient>,
    cache: RwLock<HashMap<Address, TokenInfo>>,
}

/// `string` return data, or the `bytes32` form older tokens use
fn decode_text<S: SolCall<Return = String>, B: SolCall<Return = alloy::primitives::B256>>(
    raw: &[u8],
) -> Result<String, ChainError> {
    if let Ok(text) = S::abi_decode_returns(raw) {
        return Ok(text);
    }
    let word = B::abi_decode_returns(raw).map_err(|e| ChainError::Decode(format!("{}: {}", S::SIGNATURE, e)))?;
    let end = word.iter().position(|b| *b == 0).unwrap_or(word.len());
    Ok(String::from_utf8_lossy(&word[..end]).into_owned())
}

impl Erc20MetadataProvider {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self {
            chain,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn raw(&self, token: Address, data: Vec<u8>) -> Result<Bytes, ChainError> {
        self.chain.call(&CallRequest::new(token, data)).await
    }

    async fn fetch(&self, token: Address) -> Result<TokenInfo, AppError> {
        let chain = self.chain.as_ref();
        let (symbol, name, decimals, supply) = tokio::join!(
            self.raw(token, IERC20::symbolCall {}.abi_encode()),
            self.raw(token, IERC20::nameCall {}.abi_encode()),
            self.raw(token, IERC20::decimalsCall {}.abi_encode()),
            contracts::read(chain, token, &IERC20::totalSupplyCall {}),
        );

        // decimals drive every amount conversion, so they are mandatory and read at full width
        let wide = U256::abi_decode(&decimals?).map_err(|e| AppError::BlockchainError(format!("{} decimals: {}", token, e)))?;
        let decimals = u8::try_from(wide)
            .map_err(|_| AppError::BlockchainError(format!("{} reports {} decimals", token, wide)))?;

        let symbol = symbol
            .and_then(|raw| decode_text::<IERC20::symbolCall, IERC20Bytes32::symbolCall>(&raw))
            .unwrap_or_else(|e| {
                warn!("⚠️ No symbol for {}: {}", token.short(), e);
                "UNKNOWN".to_string()
            });
        let name = name
            .and_then(|raw| decode_text::<IERC20::nameCall, IERC20Bytes32::nameCall>(&raw))
            .ok()
            .filter(|n| !n.is_empty());
        let total_supply = supply.unwrap_or_else(|e| {
            debug!("No totalSupply for {}: {}", token.short(), e);
            U256::ZERO
        });

        Ok(TokenInfo {
            address: token,
            symbol,
            name,
            decimals,
            total_supply,
        })
    }
}

#[async_trait]
impl TokenMetadataProvider for Erc20MetadataProvider {
    async fn info(&self, token: Address) -> Result<TokenInfo, AppError> {
        if let Some(info) = self.cache.read().await.get(&token) {
            return Ok(info.clone());
        }

        let info = self.fetch(token).await?;
        debug!("🪙 {} = {} ({} decimals)", token.short(), info.symbol, info.decimals);
        self.cache.write().await.insert(token, info.clone());
        Ok(info)
    }
}
