//! CLI commands and handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::domain::external::TokenMetadataProvider;
use crate::domain::persistence::StateStore;
use crate::domain::position::Strategy;
use crate::domain::quote::{select_best, GasPriceCache, QuoteAggregator, QuoteRequest};
use crate::domain::risk::RiskGate;
use crate::infrastructure::blockchain::{Erc20MetadataProvider, RpcChainClient, VenueFactory};
use crate::infrastructure::storage::JsonFileStore;
use crate::shared::config::{BotConfig, ConfigLoader};
use crate::shared::types::{Address, AddressExt};
use crate::shared::utils::{eth_to_wei, format_units, from_units, wei_to_eth};

use super::bootstrap::TradingContext;
use super::monitor::{shutdown_channel, spawn_position_monitor, spawn_rebalancer};
use super::pipeline::{EntryOutcome, EntryPipeline};

#[derive(Parser)]
#[command(name = "dexsniper")]
#[command(version, about = "EVM DEX sniper: multi-venue quotes, risk-gated buys and managed exits")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// JSON-RPC endpoint (overrides config)
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// Price trades but never broadcast them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// State directory (overrides config)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trade candidate tokens and manage open positions until ctrl-c
    Run {
        /// Candidate token addresses; read line by line from stdin when absent
        #[arg(short, long)]
        token: Vec<Address>,

        /// Strategy for new entries (memecoin or altcoin)
        #[arg(short, long, default_value = "memecoin")]
        strategy: Strategy,
    },

    /// Show the best quote across all venues
    Quote {
        /// Token to price
        token: Address,

        /// Amount in: ETH for a buy, tokens for a sell
        #[arg(short, long, default_value_t = 0.001)]
        amount: f64,

        /// Quote selling the token instead of buying it
        #[arg(long)]
        sell: bool,
    },

    /// Print risk report and open positions from the state directory
    Status,
}

impl Cli {
    /// Configuration file (or defaults) with command-line overrides applied
    pub fn load_config(&self) -> Result<BotConfig> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::load(path)?,
            None => ConfigLoader::parse("")?,
        };
        if let Some(rpc_url) = &self.rpc_url {
            config.network.rpc_url = rpc_url.clone();
        }
        if self.dry_run {
            config.execution.dry_run = true;
        }
        if let Some(data_dir) = &self.data_dir {
            config.storage.data_dir = data_dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(cli: Cli) -> Result<()> {
        let config = cli.load_config().context("invalid configuration")?;
        match cli.command {
            Commands::Run { token, strategy } => Self::execute_run_command(config, token, strategy).await,
            Commands::Quote { token, amount, sell } => Self::execute_quote_command(config, token, amount, sell).await,
            Commands::Status => Self::execute_status_command(config).await,
        }
    }

    async fn execute_run_command(config: BotConfig, tokens: Vec<Address>, strategy: Strategy) -> Result<()> {
        info!("🚀 Starting dexsniper v{}", env!("CARGO_PKG_VERSION"));
        let tick = Duration::from_secs(config.positions.tick_interval_secs);
        let rebalance_every = Duration::from_secs(config.rebalancer.interval_secs);

        let ctx = TradingContext::build(config).await.context("failed to initialise trading context")?;
        ctx.check_chain().await?;

        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let monitor = spawn_position_monitor(ctx.ledger.clone(), tick, shutdown_rx.clone());
        let rebalancer = spawn_rebalancer(ctx.rebalancer.clone(), rebalance_every, shutdown_rx);

        let mut entries = JoinSet::new();
        for token in tokens.iter().copied() {
            spawn_entry(&mut entries, ctx.pipeline.clone(), token, strategy);
        }

        let mut stdin_open = tokens.is_empty();
        if stdin_open {
            info!("📥 Reading candidate tokens from stdin");
        }
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("🛑 Shutdown requested");
                    break;
                }
                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() || line.starts_with('#') {
                            continue;
                        }
                        match Address::from_str(line) {
                            Ok(token) => spawn_entry(&mut entries, ctx.pipeline.clone(), token, strategy),
                            Err(e) => warn!("⚠️ Ignoring candidate {:?}: {}", line, e),
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!("⚠️ stdin closed: {}", e);
                        stdin_open = false;
                    }
                },
                Some(joined) = entries.join_next() => {
                    if let Err(e) = joined {
                        error!("❌ Entry task panicked: {}", e);
                    }
                }
            }
        }

        let _ = shutdown_tx.send(true);
        // in-flight buys finish before the process exits
        while let Some(joined) = entries.join_next().await {
            if let Err(e) = joined {
                error!("❌ Entry task panicked: {}", e);
            }
        }
        monitor.await.context("position monitor task failed")?;
        rebalancer.await.context("rebalancer task failed")?;

        info!("{}", ctx.risk.report().await);
        info!("👋 {} positions remain open", ctx.ledger.len().await);
        Ok(())
    }

    async fn execute_quote_command(config: BotConfig, token: Address, amount: f64, sell: bool) -> Result<()> {
        let rpc = Arc::new(RpcChainClient::new(
            &config.network.rpc_url,
            Duration::from_secs(config.network.request_timeout_secs),
        )?);
        let weth = config.tokens.weth;
        let venues = VenueFactory::new(rpc.clone(), weth, &config.aggregator).create_all(&config.venues)?;
        let gas = Arc::new(GasPriceCache::new(rpc.clone(), &config.aggregator));
        let aggregator = QuoteAggregator::new(venues, gas, config.aggregator.clone());
        let info = Erc20MetadataProvider::new(rpc).info(token).await?;

        let (token_in, token_out, amount_in) = if sell {
            (token, weth, from_units(amount, info.decimals))
        } else {
            (weth, token, eth_to_wei(amount))
        };

        let quotes = aggregator
            .collect_quotes(&QuoteRequest {
                token_in,
                token_out,
                amount_in,
                is_buy: !sell,
            })
            .await;
        for quote in &quotes {
            info!(
                "   {} ({}): out={} impact={:.2}% liquidity={:.4} ETH{}",
                quote.venue,
                quote.kind,
                quote.amount_out,
                quote.price_impact * 100.0,
                quote.liquidity,
                quote.error.as_ref().map(|e| format!(" error={}", e)).unwrap_or_default()
            );
        }

        let gas_price = aggregator.gas_price().await;
        match select_best(&quotes, gas_price, aggregator.config()) {
            Some(best) => {
                let out = if sell {
                    format!("{:.6} ETH", wei_to_eth(best.quote.amount_out))
                } else {
                    format!("{} {}", format_units(best.quote.amount_out, info.decimals), info.symbol)
                };
                info!(
                    "🏆 Best: {} via {} (impact {:.2}%, gas {}, score {:.4})",
                    out,
                    best.quote.venue,
                    best.quote.price_impact * 100.0,
                    best.quote.gas_estimate,
                    best.efficiency_score
                );
            }
            None => warn!("⚠️ No eligible quote for {} ({})", info.symbol, token),
        }
        Ok(())
    }

    async fn execute_status_command(config: BotConfig) -> Result<()> {
        let store = Arc::new(JsonFileStore::open(&config.storage.data_dir).await?);
        let risk = RiskGate::new(config.risk.clone()).with_store(store.clone());
        risk.load().await?;
        info!("📊 dexsniper v{} ({})", env!("CARGO_PKG_VERSION"), store.root().display());
        info!("{}", risk.report().await);

        let positions = store.load_positions().await?;
        info!("📂 Open positions: {}", positions.len());
        for p in positions {
            info!(
                "   {} {} [{}] {:.6} tokens, basis {:.6} ETH, pnl {:+.2}%, next TP {}",
                p.symbol,
                p.token.short(),
                p.strategy,
                p.entry_amount,
                p.cost_basis,
                p.pnl_percent,
                p.take_profit_levels
                    .first()
                    .map(|l| format!("{:.0}%", l * 100.0))
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        Ok(())
    }
}

fn spawn_entry(entries: &mut JoinSet<()>, pipeline: Arc<EntryPipeline>, token: Address, strategy: Strategy) {
    entries.spawn(async move {
        let outcome = pipeline.handle_candidate(token, strategy).await;
        match &outcome {
            EntryOutcome::Opened(_) => info!("📋 {}: {}", token.short(), outcome),
            _ => warn!("📋 {}: {}", token.short(), outcome),
        }
    });
}
