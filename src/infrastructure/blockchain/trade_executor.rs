//! Trade executor: quote, price, sign, broadcast and confirm one swap

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::domain::chain::{CallRequest, ChainClient, TransactionReceipt, TransactionSigner, UnsignedTransaction};
use crate::domain::execution::{
    ExecutionConfig, GasPolicy, NonceManager, SlippagePolicy, TradeExecution, TradeRequest, TradeResult,
};
use crate::domain::quote::{BestQuote, QuoteAggregator};
use crate::shared::errors::{ChainError, TradeError};
use crate::shared::types::{Address, AddressExt, U256};
use crate::shared::utils::{format_units, generate_id, wei_to_eth};

use super::contracts::{self, IERC20};
use super::swap_calls::{self, OutputKind, SwapCall};

/// Outcome of the pre-broadcast stage
struct PreparedTrade {
    best: BestQuote,
    min_amount_out: u128,
    gas_price: u128,
}

/// A failed attempt, with the hash once a transaction has been broadcast
struct Failure {
    error: TradeError,
    tx_hash: Option<String>,
}

impl Failure {
    fn on_chain(error: TradeError, tx_hash: String) -> Self {
        Self {
            error,
            tx_hash: Some(tx_hash),
        }
    }
}

impl From<TradeError> for Failure {
    fn from(error: TradeError) -> Self {
        Self { error, tx_hash: None }
    }
}

impl From<ChainError> for Failure {
    fn from(error: ChainError) -> Self {
        TradeError::from(error).into()
    }
}

pub struct TradeExecutor {
    aggregator: Arc<QuoteAggregator>,
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn TransactionSigner>,
    nonces: NonceManager,
    slippage: SlippagePolicy,
    gas: GasPolicy,
    config: ExecutionConfig,
    weth: Address,
    chain_id: u64,
}

impl TradeExecutor {
    pub fn new(
        aggregator: Arc<QuoteAggregator>,
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn TransactionSigner>,
        config: ExecutionConfig,
        weth: Address,
        chain_id: u64,
    ) -> Self {
        let nonces = NonceManager::new(
            chain.clone(),
            signer.address(),
            Duration::from_secs(config.nonce_ttl_secs),
        );
        Self {
            aggregator,
            chain,
            signer,
            nonces,
            slippage: SlippagePolicy::from_config(&config),
            gas: GasPolicy::from_config(&config),
            config,
            weth,
            chain_id,
        }
    }

    pub fn wallet(&self) -> Address {
        self.signer.address()
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Native balance of the trading wallet in ETH
    pub async fn wallet_balance(&self) -> Result<f64, TradeError> {
        let wei = self.chain.balance(self.wallet()).await?;
        Ok(wei_to_eth(contracts::raw_amount(wei, "balance")?))
    }

    async fn run(&self, request: &TradeRequest, started: Instant) -> Result<TradeResult, Failure> {
        let prepared = self.prepare(request).await?;

        if self.config.dry_run {
            return Ok(self.simulated(request, &prepared, started));
        }

        let wallet = self.wallet();
        let quote = &prepared.best.quote;

        if !request.is_buy {
            self.ensure_allowance(request.token_in, quote.router, request.amount_in, prepared.gas_price)
                .await?;
        }

        let deadline = (Utc::now().timestamp().max(0) as u64) + request.deadline_secs;
        let call = swap_calls::build_swap(quote, request, prepared.min_amount_out, wallet, self.weth, deadline)?;

        let receipt = self.submit(&call, prepared.gas_price).await?;
        let tx_hash = receipt.tx_hash.clone();

        if !receipt.status {
            error!("❌ Swap reverted on {}: {}", quote.venue, tx_hash);
            return Err(Failure::on_chain(TradeError::TransactionReverted(tx_hash.clone()), tx_hash));
        }

        let output = SwapCall::output_kind(quote, request, self.weth);
        let amount_out = match self.realized_output(&receipt, output) {
            Ok(Some(amount)) => amount,
            Ok(None) => {
                debug!("No output log matched for {}, using quoted amount", tx_hash);
                quote.amount_out
            }
            Err(e) => return Err(Failure::on_chain(e, tx_hash)),
        };

        let effective_price = receipt.effective_gas_price.unwrap_or(prepared.gas_price);
        let slippage_error = (amount_out < prepared.min_amount_out).then(|| TradeError::SlippageExceeded {
            expected_min: prepared.min_amount_out,
            actual: amount_out,
        });
        if slippage_error.is_some() {
            warn!(
                "⚠️ Realized output {} below minimum {} on {}",
                amount_out, prepared.min_amount_out, tx_hash
            );
        }

        info!(
            "✅ {} executed on {}: in={} out={} gas={} tx={}",
            if request.is_buy { "Buy" } else { "Sell" },
            quote.venue,
            request.amount_in,
            amount_out,
            receipt.gas_used,
            tx_hash
        );

        Ok(TradeResult {
            success: true,
            tx_hash: Some(tx_hash),
            amount_in: request.amount_in,
            amount_out,
            min_amount_out: prepared.min_amount_out,
            gas_used: receipt.gas_used,
            gas_price: effective_price,
            total_cost: (receipt.gas_used as u128).saturating_mul(effective_price),
            execution_time: started.elapsed(),
            venue: Some(quote.venue.clone()),
            error: slippage_error,
        })
    }

    /// Quote, slippage bound, balance check and gas price
    async fn prepare(&self, request: &TradeRequest) -> Result<PreparedTrade, TradeError> {
        let best = self
            .aggregator
            .best_quote(request.token_in, request.token_out, request.amount_in, request.is_buy)
            .await
            .ok_or(TradeError::QuoteUnavailable)?;

        let slippage = self.slippage.effective(&best.quote, request.max_slippage);
        let min_amount_out = SlippagePolicy::min_amount_out(best.quote.amount_out, slippage);
        debug!(
            "🎯 {} slippage {:.2}% min_out {}",
            best.quote.venue,
            slippage * 100.0,
            min_amount_out
        );

        if request.is_buy && !self.config.dry_run {
            let available = self.chain.balance(self.wallet()).await?;
            if available < U256::from(request.amount_in) {
                return Err(TradeError::InsufficientBalance {
                    required: request.amount_in,
                    // below a u128 amount, so it fits
                    available: available.to::<u128>(),
                });
            }
        }

        let network = self.chain.gas_price().await?;
        let gas_price = self.gas.price(network);

        Ok(PreparedTrade {
            best,
            min_amount_out,
            gas_price,
        })
    }

    fn simulated(&self, request: &TradeRequest, prepared: &PreparedTrade, started: Instant) -> TradeResult {
        let quote = &prepared.best.quote;
        info!(
            "🧪 Dry run {} on {}: in={} out={}",
            if request.is_buy { "buy" } else { "sell" },
            quote.venue,
            request.amount_in,
            quote.amount_out
        );
        TradeResult {
            success: true,
            tx_hash: Some(format!("dry-run-{}", generate_id())),
            amount_in: request.amount_in,
            amount_out: quote.amount_out,
            min_amount_out: prepared.min_amount_out,
            gas_used: quote.gas_estimate,
            gas_price: prepared.gas_price,
            total_cost: (quote.gas_estimate as u128).saturating_mul(prepared.gas_price),
            execution_time: started.elapsed(),
            venue: Some(quote.venue.clone()),
            error: None,
        }
    }

    /// Approve the router for unlimited spending when the allowance is short
    async fn ensure_allowance(
        &self,
        token: Address,
        spender: Address,
        amount: u128,
        gas_price: u128,
    ) -> Result<(), Failure> {
        let owner = self.wallet();
        let current = contracts::read(self.chain.as_ref(), token, &IERC20::allowanceCall { owner, spender }).await?;
        if current >= U256::from(amount) {
            return Ok(());
        }

        info!("🔓 Approving {} for {}", spender.short(), token.short());
        let call = SwapCall {
            to: token,
            data: swap_calls::approve_max_call(spender).into(),
            value: U256::ZERO,
        };
        let receipt = self.submit(&call, gas_price).await?;
        if !receipt.status {
            let message = format!("approve {}", receipt.tx_hash);
            return Err(Failure::on_chain(TradeError::TransactionReverted(message), receipt.tx_hash));
        }
        Ok(())
    }

    /// Estimate, sign, broadcast and wait for inclusion
    async fn submit(&self, call: &SwapCall, gas_price: u128) -> Result<TransactionReceipt, Failure> {
        let wallet = self.wallet();
        let estimate = self
            .chain
            .estimate_gas(&CallRequest {
                from: Some(wallet),
                to: call.to,
                data: call.data.clone(),
                value: call.value,
            })
            .await?;

        let nonce = self.nonces.next().await?;
        // the whole price is offered as tip, which prices like a legacy transaction
        let tx = UnsignedTransaction {
            from: wallet,
            to: call.to,
            data: call.data.clone(),
            value: call.value,
            gas_limit: self.gas.limit(estimate),
            max_fee_per_gas: gas_price,
            max_priority_fee_per_gas: gas_price,
            nonce,
            chain_id: self.chain_id,
        };

        let raw = match self.signer.sign(&tx).await {
            Ok(raw) => raw,
            Err(e) => {
                self.nonces.invalidate().await;
                return Err(e.into());
            }
        };

        let tx_hash = match self.chain.send_raw_transaction(&raw).await {
            Ok(hash) => hash,
            Err(e) => {
                self.nonces.invalidate().await;
                return Err(e.into());
            }
        };
        info!(
            "🚀 Sent {} (nonce {}, gas {} @ {} gwei)",
            tx_hash,
            nonce,
            tx.gas_limit,
            format_units(gas_price, 9)
        );

        let timeout = Duration::from_secs(self.config.receipt_timeout_secs);
        match self.chain.wait_for_receipt(&tx_hash, timeout).await {
            Ok(receipt) => Ok(receipt),
            // the transaction may still land; never resubmit it blindly
            Err(ChainError::Timeout(_)) => Err(Failure::on_chain(TradeError::ConfirmationTimeout(tx_hash.clone()), tx_hash)),
            Err(e) => Err(Failure::on_chain(e.into(), tx_hash)),
        }
    }

    fn realized_output(&self, receipt: &TransactionReceipt, output: OutputKind) -> Result<Option<u128>, TradeError> {
        let summed = match output {
            OutputKind::Token(token) => contracts::transfers_to(&receipt.logs, token, self.wallet()),
            OutputKind::Native => contracts::weth_withdrawals(&receipt.logs, self.weth),
        };
        Ok(summed.map(|v| contracts::raw_amount(v, "output")).transpose()?)
    }
}

#[async_trait]
impl TradeExecution for TradeExecutor {
    async fn execute(&self, request: &TradeRequest) -> TradeResult {
        let started = Instant::now();
        match self.run(request, started).await {
            Ok(result) => result,
            Err(Failure { error, tx_hash }) => {
                warn!(
                    "❌ Trade {} {} failed after {:?}: {}",
                    if request.is_buy { "buy" } else { "sell" },
                    request.token().short(),
                    started.elapsed(),
                    error
                );
                let mut result = TradeResult::failed(request.amount_in, error, started.elapsed());
                result.tx_hash = tx_hash;
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::{AggregatorConfig, GasPriceCache, VenueHandle, VenueKind};
    use crate::infrastructure::blockchain::contracts::{emitted, IUniswapV2Router, IWETH9};
    use crate::test_support::{FakeChain, FakeSigner, FakeVenue};
    use alloy::sol_types::SolCall;
    use std::sync::atomic::Ordering;

    const WALLET: Address = Address::repeat_byte(0xaa);
    const WETH: Address = Address::repeat_byte(0x42);
    const TOKEN: Address = Address::repeat_byte(0x01);

    fn executor(chain: Arc<FakeChain>, venue: FakeVenue, config: ExecutionConfig) -> TradeExecutor {
        let agg_config = AggregatorConfig::default();
        let gas = Arc::new(GasPriceCache::new(chain.clone(), &agg_config));
        let aggregator = Arc::new(QuoteAggregator::new(
            vec![VenueHandle {
                client: Arc::new(venue),
                timeout: Duration::from_millis(200),
            }],
            gas,
            agg_config,
        ));
        TradeExecutor::new(aggregator, chain, Arc::new(FakeSigner::new(WALLET)), config, WETH, 8453)
    }

    fn v2_venue(amount_out: u128) -> FakeVenue {
        FakeVenue::fixed("uniswap_v2", VenueKind::ConstantProduct, amount_out, 0.02, 5.0)
    }

    fn transfer_log(token: Address, to: Address, amount: u128) -> alloy::primitives::Log {
        emitted(
            token,
            &IERC20::Transfer {
                from: Address::repeat_byte(0x77),
                to,
                value: U256::from(amount),
            },
        )
    }

    #[tokio::test]
    async fn test_buy_reads_output_from_transfer_logs() {
        let chain = Arc::new(FakeChain::new());
        chain.set_receipt_logs(vec![transfer_log(TOKEN, WALLET, 995_000)]);
        let exec = executor(chain.clone(), v2_venue(1_000_000), ExecutionConfig::default());

        let result = exec.execute(&TradeRequest::buy(WETH, TOKEN, 1_000_000_000_000_000)).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.amount_out, 995_000);
        assert_eq!(result.error, None);
        assert_eq!(result.venue.as_deref(), Some("uniswap_v2"));
        assert_eq!(result.total_cost, result.gas_used as u128 * result.gas_price);

        let sent = chain.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].value, U256::from(1_000_000_000_000_000u64));
        assert_eq!(sent[0].data[..4], IUniswapV2Router::swapExactETHForTokensCall::SELECTOR);
        assert_eq!(sent[0].chain_id, 8453);
        // estimate 150k * 1.1
        assert_eq!(sent[0].gas_limit, 165_000);
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_terminal_and_not_broadcast() {
        let chain = Arc::new(FakeChain::new());
        chain.balance.store(10, Ordering::SeqCst);
        let exec = executor(chain.clone(), v2_venue(1_000_000), ExecutionConfig::default());

        let result = exec.execute(&TradeRequest::buy(WETH, TOKEN, 1_000)).await;
        assert!(!result.success);
        assert!(matches!(result.error, Some(TradeError::InsufficientBalance { required: 1_000, available: 10 })));
        assert!(!result.is_retryable());
        assert!(!result.reached_chain());
        assert!(chain.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revert_surfaces_transaction_reverted() {
        let chain = Arc::new(FakeChain::new());
        chain.receipt_status.store(false, Ordering::SeqCst);
        let exec = executor(chain.clone(), v2_venue(1_000_000), ExecutionConfig::default());

        let result = exec.execute(&TradeRequest::buy(WETH, TOKEN, 1_000)).await;
        assert!(matches!(result.error, Some(TradeError::TransactionReverted(_))));
        assert!(!result.is_retryable());
        assert!(result.reached_chain());
        assert!(result.tx_hash.is_some());
    }

    #[tokio::test]
    async fn test_low_output_flags_slippage_on_success() {
        let chain = Arc::new(FakeChain::new());
        chain.set_receipt_logs(vec![transfer_log(TOKEN, WALLET, 500_000)]);
        let exec = executor(chain, v2_venue(1_000_000), ExecutionConfig::default());

        let result = exec.execute(&TradeRequest::buy(WETH, TOKEN, 1_000)).await;
        assert!(result.success);
        assert!(result.slippage_exceeded());
    }

    #[tokio::test]
    async fn test_sell_approves_then_swaps_for_native() {
        let chain = Arc::new(FakeChain::new());
        chain.allowance.store(0, Ordering::SeqCst);
        chain.set_receipt_logs(vec![emitted(
            WETH,
            &IWETH9::Withdrawal {
                src: Address::repeat_byte(0xee),
                wad: U256::from(2_000_000u64),
            },
        )]);
        let exec = executor(chain.clone(), v2_venue(2_100_000), ExecutionConfig::default());

        let result = exec.execute(&TradeRequest::sell(TOKEN, WETH, 5_000)).await;
        assert!(result.success);
        assert_eq!(result.amount_out, 2_000_000);

        let sent = chain.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].data[..4], IERC20::approveCall::SELECTOR);
        assert_eq!(sent[0].to, TOKEN);
        assert_eq!(sent[1].data[..4], IUniswapV2Router::swapExactTokensForETHCall::SELECTOR);
        assert_eq!(sent[1].nonce, sent[0].nonce + 1);
    }

    #[tokio::test]
    async fn test_oversized_output_log_is_an_error_not_a_clamp() {
        let chain = Arc::new(FakeChain::new());
        chain.set_receipt_logs(vec![emitted(
            TOKEN,
            &IERC20::Transfer {
                from: Address::repeat_byte(0x77),
                to: WALLET,
                value: U256::from(1u8) << 130,
            },
        )]);
        let exec = executor(chain, v2_venue(1_000_000), ExecutionConfig::default());

        let result = exec.execute(&TradeRequest::buy(WETH, TOKEN, 1_000)).await;
        assert!(!result.success);
        assert!(matches!(result.error, Some(TradeError::Abi(_))));
        assert!(result.reached_chain());
    }

    #[tokio::test]
    async fn test_broadcast_failure_is_retryable() {
        let chain = Arc::new(FakeChain::new());
        chain.fail_sends.store(1, Ordering::SeqCst);
        let exec = executor(chain.clone(), v2_venue(1_000_000), ExecutionConfig::default());

        let result = exec.execute(&TradeRequest::buy(WETH, TOKEN, 1_000)).await;
        assert!(matches!(result.error, Some(TradeError::TransientNetworkError(_))));
        assert!(result.is_retryable());
        assert!(!result.reached_chain());
    }

    #[tokio::test]
    async fn test_dry_run_never_broadcasts() {
        let chain = Arc::new(FakeChain::new());
        chain.balance.store(0, Ordering::SeqCst);
        let config = ExecutionConfig { dry_run: true, ..ExecutionConfig::default() };
        let exec = executor(chain.clone(), v2_venue(1_000_000), config);

        let result = exec.execute(&TradeRequest::buy(WETH, TOKEN, 1_000)).await;
        assert!(result.success);
        assert_eq!(result.amount_out, 1_000_000);
        assert!(result.tx_hash.unwrap().starts_with("dry-run-"));
        assert!(chain.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_quote_fails_with_quote_unavailable() {
        let chain = Arc::new(FakeChain::new());
        let exec = executor(chain, FakeVenue::failing("gone", TradeError::QuoteUnavailable), ExecutionConfig::default());
        let result = exec.execute(&TradeRequest::buy(WETH, TOKEN, 1_000)).await;
        assert_eq!(result.error, Some(TradeError::QuoteUnavailable));
        assert!(!result.reached_chain());
    }
}
