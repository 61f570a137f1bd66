//! Bot configuration: TOML file, every section defaulted

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::execution::ExecutionConfig;
use crate::domain::portfolio::RebalancerConfig;
use crate::domain::position::PositionConfig;
use crate::domain::quote::{AggregatorConfig, VenueKind};
use crate::domain::risk::RiskLimits;
use crate::shared::errors::AppError;
use crate::shared::types::Address;
use alloy::primitives::address;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub network: NetworkConfig,
    pub wallet: WalletConfig,
    pub tokens: TokensConfig,
    pub venues: Vec<VenueConfig>,
    pub aggregator: AggregatorConfig,
    pub execution: ExecutionConfig,
    pub risk: RiskLimits,
    pub positions: PositionConfig,
    pub rebalancer: RebalancerConfig,
    pub storage: StorageConfig,
    pub notifications: NotificationConfig,
    pub security: SecurityConfig,
}

/// JSON-RPC endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub request_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://mainnet.base.org".to_string(),
            chain_id: 8453,
            request_timeout_secs: 10,
            receipt_poll_interval_ms: 1000,
        }
    }
}

/// Trading account. The key itself never lives in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Expected account; checked against the key when both are present
    pub address: Option<Address>,
    /// Environment variable holding the hex private key
    pub private_key_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            address: None,
            private_key_env: "PRIVATE_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    /// Wrapped native token, used as the path token for every swap
    pub weth: Address,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            weth: address!("4200000000000000000000000000000000000006"),
        }
    }
}

/// One configured trading venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub name: String,
    pub kind: VenueKind,
    pub router: Address,
    pub factory: Address,
    #[serde(default)]
    pub quoter: Option<Address>,
    #[serde(default = "default_venue_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_venue_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// Static token screening applied before the first entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub denylist: Vec<Address>,
}

impl BotConfig {
    /// Uniswap V2 and V3 deployments on Base
    pub fn default_venues() -> Vec<VenueConfig> {
        vec![
            VenueConfig {
                name: "uniswap_v2".to_string(),
                kind: VenueKind::ConstantProduct,
                router: address!("4752ba5dbc23f44d87826276bf6fd6b1c372ad24"),
                factory: address!("8909dc15e40173ff4699343b6eb8132c65e18ec6"),
                quoter: None,
                timeout_ms: default_venue_timeout_ms(),
            },
            VenueConfig {
                name: "uniswap_v3".to_string(),
                kind: VenueKind::ConcentratedLiquidity,
                router: address!("2626664c2603336e57b271c5c0b26f421741e481"),
                factory: address!("33128a8fc17869897dce68ed026d694621f6fdfd"),
                quoter: Some(address!("3d4e44eb1374240ce5f1b871ab261cd16335b76a")),
                timeout_ms: default_venue_timeout_ms(),
            },
        ]
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), AppError> {
        let unit = |name: &str, v: f64| -> Result<(), AppError> {
            if !(0.0..=1.0).contains(&v) {
                return Err(AppError::ConfigError(format!("{} must be within [0, 1], got {}", name, v)));
            }
            Ok(())
        };

        if self.network.rpc_url.trim().is_empty() {
            return Err(AppError::ConfigError("network.rpc_url is empty".to_string()));
        }
        unit("aggregator.max_price_impact", self.aggregator.max_price_impact)?;
        unit("aggregator.max_slippage", self.aggregator.max_slippage)?;
        unit("execution.base_slippage", self.execution.base_slippage)?;
        unit("execution.max_slippage", self.execution.max_slippage)?;
        unit("risk.max_exposure", self.risk.max_exposure)?;
        unit("risk.max_daily_drawdown", self.risk.max_daily_drawdown)?;
        unit("positions.stop_loss", self.positions.stop_loss)?;
        unit("positions.trailing_stop", self.positions.trailing_stop)?;
        unit("positions.partial_exit_fraction", self.positions.partial_exit_fraction)?;
        unit("rebalancer.reinvest_fraction", self.rebalancer.reinvest_fraction)?;

        if self.execution.base_slippage > self.execution.max_slippage {
            return Err(AppError::ConfigError(
                "execution.base_slippage exceeds execution.max_slippage".to_string(),
            ));
        }
        if self.execution.base_gas_price_gwei > self.execution.max_gas_price_gwei {
            return Err(AppError::ConfigError(
                "execution.base_gas_price_gwei exceeds execution.max_gas_price_gwei".to_string(),
            ));
        }
        if self.execution.max_retries == 0 {
            return Err(AppError::ConfigError("execution.max_retries must be at least 1".to_string()));
        }
        if self.risk.capital <= 0.0 {
            return Err(AppError::ConfigError("risk.capital must be positive".to_string()));
        }
        if self.positions.take_profit_levels.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AppError::ConfigError(
                "positions.take_profit_levels must be strictly ascending".to_string(),
            ));
        }
        if self.positions.tick_interval_secs == 0 {
            return Err(AppError::ConfigError("positions.tick_interval_secs must be positive".to_string()));
        }
        if self.positions.exit_retry_secs > self.positions.max_exit_retry_secs {
            return Err(AppError::ConfigError(
                "positions.exit_retry_secs exceeds positions.max_exit_retry_secs".to_string(),
            ));
        }
        if self.positions.max_exit_retry_secs > 86_400 {
            return Err(AppError::ConfigError(
                "positions.max_exit_retry_secs must be at most one day".to_string(),
            ));
        }
        if self.rebalancer.interval_secs == 0 {
            return Err(AppError::ConfigError("rebalancer.interval_secs must be positive".to_string()));
        }
        if self.wallet.private_key_env.trim().is_empty() {
            return Err(AppError::ConfigError("wallet.private_key_env is empty".to_string()));
        }
        Ok(())
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<BotConfig, AppError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration text; an empty venue list falls back to the Base deployments
    pub fn parse(content: &str) -> Result<BotConfig, AppError> {
        let mut config: BotConfig = toml::from_str(content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))?;
        if config.venues.is_empty() {
            config.venues = BotConfig::default_venues();
        }
        Ok(config)
    }
}
