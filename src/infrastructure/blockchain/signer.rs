//! Local key signing for the trading wallet

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::TxKind;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::info;

use crate::domain::chain::{TransactionSigner, UnsignedTransaction};
use crate::shared::errors::{AppError, ChainError};
use crate::shared::types::{Address, AddressExt};

/// Signs EIP-1559 transactions with a private key held in memory
pub struct LocalKeySigner {
    inner: PrivateKeySigner,
}

impl LocalKeySigner {
    pub fn from_hex(key: &str) -> Result<Self, AppError> {
        let inner = key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| AppError::ConfigError(format!("Invalid private key: {}", e)))?;
        Ok(Self { inner })
    }

    /// Key from the environment variable `var`; `Ok(None)` when it is unset or empty
    pub fn from_env(var: &str) -> Result<Option<Self>, AppError> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => {
                let signer = Self::from_hex(&key)?;
                info!("🔑 Loaded signing key for {} from {}", signer.address().short(), var);
                Ok(Some(signer))
            }
            _ => Ok(None),
        }
    }
}

pub fn eip1559(tx: &UnsignedTransaction) -> TxEip1559 {
    TxEip1559 {
        chain_id: tx.chain_id,
        nonce: tx.nonce,
        gas_limit: tx.gas_limit,
        max_fee_per_gas: tx.max_fee_per_gas,
        max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
        to: TxKind::Call(tx.to),
        value: tx.value,
        input: tx.data.clone(),
        ..Default::default()
    }
}

#[async_trait]
impl TransactionSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, ChainError> {
        if tx.from != self.address() {
            return Err(ChainError::Decode(format!(
                "transaction from {} cannot be signed by {}",
                tx.from,
                self.address()
            )));
        }
        let mut unsigned = eip1559(tx);
        let signature = self
            .inner
            .sign_transaction_sync(&mut unsigned)
            .map_err(|e| ChainError::Decode(format!("signing failed: {}", e)))?;
        let envelope = TxEnvelope::from(unsigned.into_signed(signature));
        Ok(envelope.encoded_2718())
    }
}

/// Address-only wallet for dry runs; refuses to sign
pub struct WatchOnlySigner {
    address: Address,
}

impl WatchOnlySigner {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

#[async_trait]
impl TransactionSigner for WatchOnlySigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, _tx: &UnsignedTransaction) -> Result<Vec<u8>, ChainError> {
        Err(ChainError::Decode(format!("no signing key loaded for {}", self.address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::consensus::Transaction;
    use alloy::eips::eip2718::Decodable2718;
    use crate::shared::types::{Bytes, U256};

    // first anvil development account
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn dev_address() -> Address {
        "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap()
    }

    fn unsigned(from: Address) -> UnsignedTransaction {
        UnsignedTransaction {
            from,
            to: Address::repeat_byte(0x22),
            data: Bytes::from(vec![0x7f, 0xf3, 0x6a, 0xb5]),
            value: U256::from(1_000_000_000_000_000u64),
            gas_limit: 165_000,
            max_fee_per_gas: 1_100_000_000,
            max_priority_fee_per_gas: 1_100_000_000,
            nonce: 7,
            chain_id: 8453,
        }
    }

    #[test]
    fn test_key_derives_address() {
        let signer = LocalKeySigner::from_hex(DEV_KEY).unwrap();
        assert_eq!(signer.address(), dev_address());
        assert!(LocalKeySigner::from_hex("0x1234").is_err());
    }

    #[tokio::test]
    async fn test_signed_envelope_decodes_back() {
        let signer = LocalKeySigner::from_hex(DEV_KEY).unwrap();
        let raw = signer.sign(&unsigned(dev_address())).await.unwrap();

        let envelope = TxEnvelope::decode_2718(&mut raw.as_slice()).unwrap();
        assert!(envelope.is_eip1559());
        assert_eq!(envelope.chain_id(), Some(8453));
        assert_eq!(envelope.nonce(), 7);
        assert_eq!(envelope.gas_limit(), 165_000);
        assert_eq!(envelope.to(), Some(Address::repeat_byte(0x22)));
        assert_eq!(envelope.value(), U256::from(1_000_000_000_000_000u64));
        assert_eq!(envelope.input().as_ref(), &[0x7f, 0xf3, 0x6a, 0xb5]);
    }

    #[tokio::test]
    async fn test_foreign_sender_is_refused() {
        let signer = LocalKeySigner::from_hex(DEV_KEY).unwrap();
        assert!(signer.sign(&unsigned(Address::repeat_byte(0x11))).await.is_err());
    }

    #[test]
    fn test_env_loading() {
        let var = "DEXSNIPER_SIGNER_TEST_KEY";
        std::env::remove_var(var);
        assert!(LocalKeySigner::from_env(var).unwrap().is_none());

        std::env::set_var(var, DEV_KEY);
        let signer = LocalKeySigner::from_env(var).unwrap().unwrap();
        assert_eq!(signer.address(), dev_address());

        std::env::set_var(var, "not-a-key");
        assert!(LocalKeySigner::from_env(var).is_err());
        std::env::remove_var(var);
    }

    #[tokio::test]
    async fn test_watch_only_never_signs() {
        let signer = WatchOnlySigner::new(dev_address());
        assert_eq!(signer.address(), dev_address());
        assert!(signer.sign(&unsigned(dev_address())).await.is_err());
    }
}
