//! Node access over an alloy HTTP provider

use alloy::network::{Ethereum, ReceiptResponse};
use alloy::primitives::B256;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::eth::{TransactionInput, TransactionReceipt as RpcReceipt, TransactionRequest};
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use std::future::IntoFuture;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;
use url::Url;

use crate::domain::chain::{CallRequest, ChainClient, TransactionReceipt};
use crate::shared::errors::{AppError, ChainError};
use crate::shared::types::{Address, Bytes, U256};

pub type HttpProvider = RootProvider<Ethereum>;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

pub struct RpcChainClient {
    provider: HttpProvider,
    url: String,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl RpcChainClient {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, AppError> {
        let parsed = Url::parse(url).map_err(|e| AppError::ConfigError(format!("Invalid RPC URL {}: {}", url, e)))?;
        Ok(Self {
            provider: RootProvider::new_http(parsed),
            url: url.to_string(),
            request_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bound one provider call by the request timeout
    async fn timed<F, T>(&self, method: &str, call: F) -> Result<T, ChainError>
    where
        F: IntoFuture<Output = Result<T, TransportError>>,
    {
        match timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(|e| classify(method, e)),
            Err(_) => Err(ChainError::Transport(format!("{} timed out after {:?}", method, self.request_timeout))),
        }
    }
}

/// Map a provider error onto the port's error kinds
pub fn classify(method: &str, error: TransportError) -> ChainError {
    match &error {
        RpcError::ErrorResp(payload) => {
            let message = payload.message.to_string();
            if message.contains("execution reverted") {
                let data = payload.data.as_ref().map(|d| d.get().to_string()).unwrap_or_default();
                ChainError::Reverted(format!("{} {}", message, data).trim().to_string())
            } else {
                ChainError::Rpc { code: payload.code, message }
            }
        }
        RpcError::DeserError { .. } | RpcError::SerError(_) => ChainError::Decode(format!("{}: {}", method, error)),
        _ => ChainError::Transport(format!("{} failed: {}", method, error)),
    }
}

pub fn call_request(request: &CallRequest) -> TransactionRequest {
    let tx = TransactionRequest::default()
        .to(request.to)
        .input(TransactionInput::new(request.data.clone()))
        .value(request.value);
    match request.from {
        Some(from) => tx.from(from),
        None => tx,
    }
}

pub fn into_receipt(receipt: &RpcReceipt) -> TransactionReceipt {
    TransactionReceipt {
        tx_hash: format!("{:#x}", receipt.transaction_hash),
        status: receipt.status(),
        gas_used: receipt.gas_used,
        effective_gas_price: Some(receipt.effective_gas_price),
        block_number: receipt.block_number.unwrap_or_default(),
        logs: receipt.inner.logs().iter().map(|log| log.inner.clone()).collect(),
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.timed("eth_chainId", self.provider.get_chain_id()).await
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        self.timed("eth_gasPrice", self.provider.get_gas_price()).await
    }

    async fn nonce(&self, address: Address) -> Result<u64, ChainError> {
        self.timed("eth_getTransactionCount", self.provider.get_transaction_count(address).pending())
            .await
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        self.timed("eth_getBalance", self.provider.get_balance(address)).await
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError> {
        self.timed("eth_call", self.provider.call(call_request(request))).await
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, ChainError> {
        self.timed("eth_estimateGas", self.provider.estimate_gas(call_request(request)))
            .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ChainError> {
        let pending = self
            .timed("eth_sendRawTransaction", self.provider.send_raw_transaction(raw))
            .await?;
        Ok(format!("{:#x}", pending.tx_hash()))
    }

    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> Result<TransactionReceipt, ChainError> {
        let hash: B256 = tx_hash
            .parse()
            .map_err(|e| ChainError::Decode(format!("bad transaction hash {}: {}", tx_hash, e)))?;
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .timed("eth_getTransactionReceipt", self.provider.get_transaction_receipt(hash))
                .await
            {
                Ok(Some(receipt)) => return Ok(into_receipt(&receipt)),
                Ok(None) => {}
                Err(ChainError::Transport(e)) => debug!("⏳ Receipt poll for {} failed: {}", tx_hash, e),
                Err(e) => return Err(e),
            }
            if Instant::now() + self.poll_interval > deadline {
                return Err(ChainError::Timeout(tx_hash.to_string()));
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::TxKind;
    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::TransportErrorKind;

    fn error_resp(code: i64, message: &'static str) -> TransportError {
        RpcError::ErrorResp(ErrorPayload {
            code,
            message: message.into(),
            data: None,
        })
    }

    #[test]
    fn test_error_classification() {
        assert!(matches!(
            classify("eth_call", error_resp(3, "execution reverted: UniswapV2: K")),
            ChainError::Reverted(m) if m.contains("UniswapV2: K")
        ));
        assert_eq!(
            classify("eth_sendRawTransaction", error_resp(-32000, "nonce too low")),
            ChainError::Rpc { code: -32000, message: "nonce too low".into() }
        );
        assert!(matches!(
            classify("eth_gasPrice", TransportErrorKind::custom_str("connection refused")),
            ChainError::Transport(m) if m.contains("eth_gasPrice")
        ));
    }

    #[test]
    fn test_call_request_shape() {
        let mut request = CallRequest::new(Address::repeat_byte(0x22), vec![0xde, 0xad]);
        request.from = Some(Address::repeat_byte(0x11));
        request.value = U256::from(255u64);
        let tx = call_request(&request);
        assert_eq!(tx.to, Some(TxKind::Call(Address::repeat_byte(0x22))));
        assert_eq!(tx.from, Some(Address::repeat_byte(0x11)));
        assert_eq!(tx.value, Some(U256::from(255u64)));
        assert_eq!(tx.input.input().map(|b| b.to_vec()), Some(vec![0xde, 0xad]));
    }

    #[test]
    fn test_receipt_conversion() {
        let raw = serde_json::json!({
            "type": "0x2",
            "status": "0x1",
            "cumulativeGasUsed": "0x1d4c0",
            "logs": [{
                "address": "0x4200000000000000000000000000000000000006",
                "topics": [format!("0x{}", "11".repeat(32))],
                "data": "0x00ff",
                "blockHash": format!("0x{}", "22".repeat(32)),
                "blockNumber": "0x10",
                "transactionHash": format!("0x{}", "ab".repeat(32)),
                "transactionIndex": "0x0",
                "logIndex": "0x0",
                "removed": false
            }],
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "transactionIndex": "0x0",
            "blockHash": format!("0x{}", "22".repeat(32)),
            "blockNumber": "0x10",
            "gasUsed": "0x1d4c0",
            "effectiveGasPrice": "0x3b9aca00",
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x2222222222222222222222222222222222222222",
            "contractAddress": null
        });
        let receipt: RpcReceipt = serde_json::from_value(raw).unwrap();
        let parsed = into_receipt(&receipt);
        assert!(parsed.status);
        assert_eq!(parsed.tx_hash, format!("0x{}", "ab".repeat(32)));
        assert_eq!(parsed.gas_used, 120_000);
        assert_eq!(parsed.effective_gas_price, Some(1_000_000_000));
        assert_eq!(parsed.block_number, 16);
        assert_eq!(parsed.logs.len(), 1);
        assert_eq!(parsed.logs[0].address, "0x4200000000000000000000000000000000000006".parse::<Address>().unwrap());
        assert_eq!(parsed.logs[0].data.data.to_vec(), vec![0x00, 0xff]);
    }

    #[test]
    fn test_bad_url_is_config_error() {
        assert!(matches!(
            RpcChainClient::new("not a url", Duration::from_secs(1)),
            Err(AppError::ConfigError(_))
        ));
    }
}
