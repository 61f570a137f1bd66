//! Hand-written fakes for the chain, venues, execution and collaborators

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;

use alloy::primitives::Log;
use alloy::sol_types::{SolCall, SolValue};

use crate::domain::chain::{CallRequest, ChainClient, TransactionReceipt, TransactionSigner, UnsignedTransaction};
use crate::domain::execution::{TradeExecution, TradeRequest, TradeResult};
use crate::domain::external::NotificationSink;
use crate::domain::position::PriceSource;
use crate::domain::quote::{Quote, QuoteRequest, VenueKind, VenueQuoteClient};
use crate::infrastructure::blockchain::contracts::IERC20;
use crate::shared::errors::{AppError, ChainError, TradeError};
use crate::shared::types::{Address, Bytes, U256};

type CallHandler = Box<dyn Fn(&CallRequest) -> Result<Bytes, ChainError> + Send + Sync>;

/// In-memory node: 1 gwei gas, 150k estimates, receipts on demand
pub struct FakeChain {
    pub nonce: AtomicU64,
    pub nonce_calls: AtomicUsize,
    pub balance: AtomicU64,
    pub allowance: AtomicU64,
    pub receipt_status: AtomicBool,
    /// Number of upcoming broadcasts that fail with a transport error
    pub fail_sends: AtomicUsize,
    pub sent: StdMutex<Vec<UnsignedTransaction>>,
    pub eth_calls: AtomicUsize,
    logs: StdMutex<Vec<Log>>,
    handler: Option<CallHandler>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            nonce: AtomicU64::new(0),
            nonce_calls: AtomicUsize::new(0),
            balance: AtomicU64::new(10_000_000_000_000_000_000),
            allowance: AtomicU64::new(u64::MAX),
            receipt_status: AtomicBool::new(true),
            fail_sends: AtomicUsize::new(0),
            sent: StdMutex::new(Vec::new()),
            eth_calls: AtomicUsize::new(0),
            logs: StdMutex::new(Vec::new()),
            handler: None,
        }
    }

    /// Answer `eth_call` with `handler`; the allowance default still applies when it is absent
    pub fn with_call_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CallRequest) -> Result<Bytes, ChainError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn set_receipt_logs(&self, logs: Vec<Log>) {
        *self.logs.lock().unwrap() = logs;
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(8453)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(1_000_000_000)
    }

    async fn nonce(&self, _address: Address) -> Result<u64, ChainError> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn balance(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(U256::from(self.balance.load(Ordering::SeqCst)))
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError> {
        self.eth_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(handler) = &self.handler {
            return handler(request);
        }
        if request.data.starts_with(&IERC20::allowanceCall::SELECTOR) {
            return Ok(U256::from(self.allowance.load(Ordering::SeqCst)).abi_encode().into());
        }
        Ok(U256::ZERO.abi_encode().into())
    }

    async fn estimate_gas(&self, _request: &CallRequest) -> Result<u64, ChainError> {
        Ok(150_000)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ChainError> {
        let pending = self.fail_sends.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_sends.store(pending - 1, Ordering::SeqCst);
            return Err(ChainError::Transport("connection reset".to_string()));
        }
        let tx: UnsignedTransaction = serde_json::from_slice(raw).map_err(|e| ChainError::Decode(e.to_string()))?;
        let mut sent = self.sent.lock().unwrap();
        sent.push(tx);
        Ok(format!("0x{:064x}", sent.len()))
    }

    async fn wait_for_receipt(&self, tx_hash: &str, _timeout: Duration) -> Result<TransactionReceipt, ChainError> {
        Ok(TransactionReceipt {
            tx_hash: tx_hash.to_string(),
            status: self.receipt_status.load(Ordering::SeqCst),
            gas_used: 120_000,
            effective_gas_price: None,
            block_number: 1,
            logs: self.logs.lock().unwrap().clone(),
        })
    }
}

/// "Signs" by JSON-encoding the transaction so `FakeChain` can read it back
pub struct FakeSigner {
    address: Address,
}

impl FakeSigner {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

#[async_trait]
impl TransactionSigner for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, ChainError> {
        serde_json::to_vec(tx).map_err(|e| ChainError::Decode(e.to_string()))
    }
}

/// Venue answering with a fixed quote or a fixed error
pub struct FakeVenue {
    name: String,
    kind: VenueKind,
    router: Address,
    answer: Result<Quote, TradeError>,
    delay: Duration,
}

impl FakeVenue {
    pub fn fixed(name: &str, kind: VenueKind, amount_out: u128, price_impact: f64, liquidity: f64) -> Self {
        let router = Address::repeat_byte(0xee);
        let fee_tier = (kind == VenueKind::ConcentratedLiquidity).then_some(3000);
        Self {
            name: name.to_string(),
            kind,
            router,
            answer: Ok(Quote {
                venue: name.to_string(),
                kind,
                router,
                amount_out,
                price_impact,
                gas_estimate: 150_000,
                slippage: 0.01,
                liquidity,
                available: true,
                fee_tier,
                error: None,
            }),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(name: &str, error: TradeError) -> Self {
        Self {
            name: name.to_string(),
            kind: VenueKind::ConstantProduct,
            router: Address::repeat_byte(0xee),
            answer: Err(error),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl VenueQuoteClient for FakeVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> VenueKind {
        self.kind
    }

    fn router(&self) -> Address {
        self.router
    }

    async fn quote(&self, _request: &QuoteRequest) -> Result<Quote, TradeError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer.clone()
    }
}

/// Plays back a fixed sequence of results, one per attempt
pub struct ScriptedExecution {
    script: StdMutex<VecDeque<TradeResult>>,
    requests: StdMutex<Vec<TradeRequest>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedExecution {
    pub fn new(script: Vec<TradeResult>) -> Self {
        Self {
            script: StdMutex::new(script.into()),
            requests: StdMutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn ok(amount_out: u128) -> TradeResult {
        TradeResult {
            success: true,
            tx_hash: Some("0xfeed".to_string()),
            amount_in: 0,
            amount_out,
            min_amount_out: 0,
            gas_used: 0,
            gas_price: 0,
            total_cost: 0,
            execution_time: Duration::ZERO,
            venue: Some("fake".to_string()),
            error: None,
        }
    }

    /// Failure before anything was broadcast
    pub fn err(error: TradeError) -> TradeResult {
        TradeResult::failed(0, error, Duration::ZERO)
    }

    /// Broadcast transaction that reverted on chain
    pub fn reverted(tx_hash: &str) -> TradeResult {
        let mut result = TradeResult::failed(0, TradeError::TransactionReverted(tx_hash.to_string()), Duration::ZERO);
        result.tx_hash = Some(tx_hash.to_string());
        result
    }

    /// Hold every attempt for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TradeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TradeExecution for ScriptedExecution {
    async fn execute(&self, request: &TradeRequest) -> TradeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        let mut result = next.unwrap_or_else(|| Self::err(TradeError::QuoteUnavailable));
        result.amount_in = request.amount_in;
        result
    }
}

/// Prices set by the test; unknown tokens have no quote
pub struct FakePriceSource {
    prices: Mutex<HashMap<Address, f64>>,
}

impl FakePriceSource {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set(&self, token: Address, price: f64) {
        self.prices.lock().await.insert(token, price);
    }
}

#[async_trait]
impl PriceSource for FakePriceSource {
    async fn price(&self, token: Address, _decimals: u8) -> Result<f64, TradeError> {
        self.prices
            .lock()
            .await
            .get(&token)
            .copied()
            .ok_or(TradeError::QuoteUnavailable)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send(&self, message: &str) -> Result<(), AppError> {
        self.messages.lock().await.push(message.to_string());
        Ok(())
    }
}
