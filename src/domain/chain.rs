//! Chain access ports: node reads, broadcast and signing

use alloy::primitives::Log;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::errors::ChainError;
use crate::shared::types::{Address, Bytes, U256};

/// Read-only contract call
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from: None,
            to,
            data: data.into(),
            value: U256::ZERO,
        }
    }
}

/// EIP-1559 transaction, fully priced and sequenced, ready to sign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub nonce: u64,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub status: bool,
    pub gas_used: u64,
    pub effective_gas_price: Option<u128>,
    pub block_number: u64,
    pub logs: Vec<Log>,
}

/// Node operations needed by quoting and execution
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Current network gas price in wei
    async fn gas_price(&self) -> Result<u128, ChainError>;

    /// Pending-block nonce for `address`
    async fn nonce(&self, address: Address) -> Result<u64, ChainError>;

    /// Native balance in wei
    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError>;

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, ChainError>;

    /// Broadcast raw signed bytes, returns the transaction hash
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ChainError>;

    /// Poll until the transaction is included or `timeout` elapses
    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> Result<TransactionReceipt, ChainError>;
}

/// Signer for the trading account
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// EIP-2718 encoded signed transaction
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, ChainError>;
}
