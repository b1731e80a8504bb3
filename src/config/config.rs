use std::time::Duration;

use alloy::primitives::Address;
use bigdecimal::BigDecimal;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - User and pool points
/// - Pool weights
/// - The sync checkpoint
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Chain access and the token/contract addresses the price oracle routes through.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    /// AMM V2 factory used to look up pairs
    pub factory: Address,
    /// USD-stable token, priced at exactly 1
    pub stable_token: Address,
    /// Routing hub (wrapped native) used for two-hop pricing
    pub hub_token: Address,
    /// Pool holding hub and stable, used by balance-based pricing
    pub hub_stable_pool: Address,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_call_timeout() -> u64 {
    30
}

/// Poller configuration: upstream endpoints and pacing.
#[derive(Debug, Deserialize, Clone)]
pub struct PollerSettings {
    /// JSON-RPC endpoint of the contract-data service
    pub rpc_url: String,
    /// Base URL of the explorer open API
    pub scan_url: String,
    #[serde(default)]
    pub scan_api_key: Option<String>,
    /// Optional page size passed to the paginated data calls
    #[serde(default)]
    pub page_limit: Option<usize>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_interval_error")]
    pub interval_error_secs: u64,
    #[serde(default = "default_interval_idle")]
    pub interval_idle_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl PollerSettings {
    pub fn interval_error(&self) -> Duration {
        Duration::from_secs(self.interval_error_secs)
    }

    pub fn interval_idle(&self) -> Duration {
        Duration::from_secs(self.interval_idle_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_buffer_size() -> usize {
    1024
}

fn default_interval_error() -> u64 {
    5
}

fn default_interval_idle() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    5
}

/// Emitter configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct EmitterSettings {
    /// Number of block heights sampled per token and window
    #[serde(default = "default_price_sample_count")]
    pub price_sample_count: usize,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_interval_error")]
    pub interval_error_secs: u64,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            price_sample_count: default_price_sample_count(),
            buffer_size: default_buffer_size(),
            interval_error_secs: default_interval_error(),
        }
    }
}

fn default_price_sample_count() -> usize {
    6
}

/// Batcher configuration.
///
/// A batch is flushed once it holds `batch_size` events or `batch_timeout_secs`
/// elapsed since the last flush attempt, whichever comes first.
#[derive(Debug, Deserialize, Clone)]
pub struct BatcherSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,
    #[serde(default = "default_interval_error")]
    pub interval_error_secs: u64,
}

impl Default for BatcherSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_secs: default_batch_timeout(),
            interval_error_secs: default_interval_error(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_timeout() -> u64 {
    3
}

/// Initial weight of a pool, seeded into the database at startup.
///
/// Weights are decimals; quote them in YAML (`"0.5"`) to keep them exact.
/// Existing rows are left alone so CLI edits survive restarts.
#[derive(Debug, Deserialize, Clone)]
pub struct PoolSettings {
    pub address: Address,
    pub trade_weight: BigDecimal,
    pub liquidity_weight: BigDecimal,
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, `POINTS__SECTION__KEY` environment
/// variables override individual values.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub chain: ChainSettings,
    pub poller: PollerSettings,
    #[serde(default)]
    pub emitter: EmitterSettings,
    #[serde(default)]
    pub batcher: BatcherSettings,
    #[serde(default)]
    pub pools: Vec<PoolSettings>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("POINTS").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.emitter.price_sample_count == 0 {
            return Err(ConfigError::Message(
                "emitter.price_sample_count must be at least 1".to_string(),
            ));
        }

        // A zero timeout would keep the flush timer permanently ready
        if self.batcher.batch_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "batcher.batch_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
