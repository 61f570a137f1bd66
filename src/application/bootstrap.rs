//! Process wiring: every component built once and shared by handle

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::chain::{ChainClient, TransactionSigner};
use crate::domain::execution::SafeTradeExecutor;
use crate::domain::external::{NotificationSink, SecurityChecker, TokenMetadataProvider};
use crate::domain::persistence::StateStore;
use crate::domain::portfolio::{PortfolioRebalancer, PositionSizer};
use crate::domain::position::{AggregatorPriceSource, PositionLedger};
use crate::domain::quote::{GasPriceCache, QuoteAggregator};
use crate::domain::risk::RiskGate;
use crate::infrastructure::blockchain::{
    Erc20MetadataProvider, LocalKeySigner, RpcChainClient, TradeExecutor, VenueFactory, WatchOnlySigner,
};
use crate::infrastructure::notifications::{LogNotificationSink, MultiNotificationSink, WebhookNotificationSink};
use crate::infrastructure::security::DenylistSecurityChecker;
use crate::infrastructure::storage::JsonFileStore;
use crate::shared::config::{BotConfig, NotificationConfig, WalletConfig};
use crate::shared::errors::AppError;
use crate::shared::types::{Address, AddressExt};

use super::pipeline::EntryPipeline;

/// All long-lived trading components
pub struct TradingContext {
    pub config: BotConfig,
    pub chain: Arc<dyn ChainClient>,
    pub aggregator: Arc<QuoteAggregator>,
    pub risk: Arc<RiskGate>,
    pub executor: Arc<SafeTradeExecutor>,
    pub ledger: Arc<PositionLedger>,
    pub sizer: Arc<PositionSizer>,
    pub rebalancer: Arc<PortfolioRebalancer>,
    pub notifier: Arc<dyn NotificationSink>,
    pub pipeline: Arc<EntryPipeline>,
}

impl TradingContext {
    /// Connect to the node, restore persisted state and wire the trading core
    pub async fn build(config: BotConfig) -> Result<Self, AppError> {
        let rpc = Arc::new(
            RpcChainClient::new(
                &config.network.rpc_url,
                Duration::from_secs(config.network.request_timeout_secs),
            )?
            .with_poll_interval(Duration::from_millis(config.network.receipt_poll_interval_ms)),
        );
        let chain: Arc<dyn ChainClient> = rpc.clone();
        let weth = config.tokens.weth;

        let venues = VenueFactory::new(chain.clone(), weth, &config.aggregator).create_all(&config.venues)?;
        let gas = Arc::new(GasPriceCache::new(chain.clone(), &config.aggregator));
        let aggregator = Arc::new(QuoteAggregator::new(venues, gas, config.aggregator.clone()));
        info!("🌐 {} venues configured on {}", aggregator.venue_count(), rpc.url());

        let signer = build_signer(&config.wallet, config.execution.dry_run)?;
        info!("👛 Trading wallet {}", signer.address().short());
        let trade_executor = Arc::new(TradeExecutor::new(
            aggregator.clone(),
            chain.clone(),
            signer,
            config.execution.clone(),
            weth,
            config.network.chain_id,
        ));
        if trade_executor.is_dry_run() {
            warn!("🧪 Dry-run mode: trades are priced but never broadcast");
        }

        let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::open(&config.storage.data_dir).await?);
        let risk = Arc::new(RiskGate::new(config.risk.clone()).with_store(store.clone()));
        if risk.load().await? {
            info!("📂 Restored risk state from {}", config.storage.data_dir.display());
        }
        let executor = Arc::new(SafeTradeExecutor::new(
            trade_executor,
            risk.clone(),
            config.execution.retry_policy(),
        ));

        let notifier = build_notifier(&config.notifications)?;
        let prices = Arc::new(AggregatorPriceSource::new(aggregator.clone(), weth));
        let ledger = Arc::new(
            PositionLedger::new(executor.clone(), prices, notifier.clone(), config.positions.clone(), weth)
                .with_store(store),
        );
        let restored = ledger.restore().await?;
        if restored > 0 {
            info!("📂 {} open positions restored", restored);
        }

        let sizer = Arc::new(PositionSizer::new(config.positions.clone()));
        let rebalancer = Arc::new(PortfolioRebalancer::new(
            ledger.clone(),
            sizer.clone(),
            notifier.clone(),
            config.rebalancer.clone(),
        ));

        let metadata: Arc<dyn TokenMetadataProvider> = Arc::new(Erc20MetadataProvider::new(chain.clone()));
        let security: Arc<dyn SecurityChecker> =
            Arc::new(DenylistSecurityChecker::new(&config.security.denylist, &[weth]));
        let pipeline = Arc::new(EntryPipeline::new(
            ledger.clone(),
            executor.clone(),
            sizer.clone(),
            metadata,
            security,
            notifier.clone(),
            weth,
        ));

        Ok(Self {
            config,
            chain,
            aggregator,
            risk,
            executor,
            ledger,
            sizer,
            rebalancer,
            notifier,
            pipeline,
        })
    }

    /// Fail early when the node serves a different chain than configured
    pub async fn check_chain(&self) -> Result<(), AppError> {
        let remote = self.chain.chain_id().await?;
        if remote != self.config.network.chain_id {
            return Err(AppError::ConfigError(format!(
                "node reports chain id {}, configuration expects {}",
                remote, self.config.network.chain_id
            )));
        }
        Ok(())
    }
}

/// Key from `wallet.private_key_env`; a dry run may go without one
pub fn build_signer(wallet: &WalletConfig, dry_run: bool) -> Result<Arc<dyn TransactionSigner>, AppError> {
    match LocalKeySigner::from_env(&wallet.private_key_env)? {
        Some(signer) => {
            if let Some(expected) = wallet.address {
                if expected != signer.address() {
                    return Err(AppError::ConfigError(format!(
                        "key in {} belongs to {}, wallet.address is {}",
                        wallet.private_key_env,
                        signer.address(),
                        expected
                    )));
                }
            }
            Ok(Arc::new(signer))
        }
        None if dry_run => {
            let address = wallet.address.unwrap_or(Address::ZERO);
            warn!("🔒 No key in {}, watching {} without signing", wallet.private_key_env, address.short());
            Ok(Arc::new(WatchOnlySigner::new(address)))
        }
        None => Err(AppError::ConfigError(format!(
            "live trading needs a private key in {}",
            wallet.private_key_env
        ))),
    }
}

/// Log sink always; webhook on top when configured
pub fn build_notifier(config: &NotificationConfig) -> Result<Arc<dyn NotificationSink>, AppError> {
    match &config.webhook_url {
        Some(url) => {
            let webhook = WebhookNotificationSink::new(url, Duration::from_secs(config.timeout_secs))?;
            Ok(Arc::new(MultiNotificationSink::new(vec![
                Box::new(LogNotificationSink),
                Box::new(webhook),
            ])))
        }
        None => Ok(Arc::new(LogNotificationSink)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // first anvil development account
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn wallet(var: &str, address: Option<Address>) -> WalletConfig {
        WalletConfig {
            address,
            private_key_env: var.to_string(),
        }
    }

    #[test]
    fn test_live_mode_needs_key() {
        let var = "DEXSNIPER_BOOTSTRAP_NO_KEY";
        std::env::remove_var(var);
        assert!(matches!(build_signer(&wallet(var, None), false), Err(AppError::ConfigError(_))));

        let watched = Address::repeat_byte(0x11);
        let signer = build_signer(&wallet(var, Some(watched)), true).unwrap();
        assert_eq!(signer.address(), watched);
    }

    #[test]
    fn test_key_must_match_configured_address() {
        let var = "DEXSNIPER_BOOTSTRAP_KEY";
        std::env::set_var(var, DEV_KEY);
        let dev: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();

        assert_eq!(build_signer(&wallet(var, None), false).unwrap().address(), dev);
        assert_eq!(build_signer(&wallet(var, Some(dev)), false).unwrap().address(), dev);
        assert!(build_signer(&wallet(var, Some(Address::repeat_byte(0x11))), false).is_err());
        std::env::remove_var(var);
    }

    #[tokio::test]
    async fn test_notifier_without_webhook_is_log_only() {
        let notifier = build_notifier(&NotificationConfig::default()).unwrap();
        assert!(notifier.send("hello").await.is_ok());
    }
}
