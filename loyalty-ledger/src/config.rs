//! Configuration for the loyalty ledger

use crate::{earning::EarningPolicy, redemption::RedemptionPolicy};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Longest accepted points lifetime, about a century
pub const MAX_POINTS_TTL_DAYS: i64 = 36_500;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Log output format
    pub log_format: LogFormat,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Batching configuration
    pub batching: BatchingConfig,

    /// Redemption rules
    pub redemption: RedemptionPolicy,

    /// Earning rules
    pub earning: EarningPolicy,

    /// Expiry sweep configuration
    pub expiry: ExpiryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/loyalty"),
            service_name: "loyalty-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_format: LogFormat::default(),
            rocksdb: RocksDBConfig::default(),
            batching: BatchingConfig::default(),
            redemption: RedemptionPolicy::default(),
            earning: EarningPolicy::default(),
            expiry: ExpiryConfig::default(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Batching of credit entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Maximum batch size (entries)
    pub max_batch_size: usize,

    /// Batch timeout (milliseconds)
    pub batch_timeout_ms: u64,

    /// Enable batching
    pub enabled: bool,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            batch_timeout_ms: 10,
            enabled: true,
        }
    }
}

/// Expiry sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Run the periodic sweep in the server
    pub enabled: bool,

    /// Seconds between sweeps
    pub sweep_interval_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 3_600,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LOYALTY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(format) = std::env::var("LOYALTY_LOG_FORMAT") {
            config.log_format = match format.as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(crate::Error::Config(format!(
                        "Unknown LOYALTY_LOG_FORMAT: {}",
                        other
                    )))
                }
            };
        }

        if let Ok(batching) = std::env::var("LOYALTY_BATCHING") {
            config.batching.enabled = parse_env("LOYALTY_BATCHING", &batching)?;
        }

        if let Ok(secs) = std::env::var("LOYALTY_EXPIRY_SWEEP_SECS") {
            config.expiry.sweep_interval_secs = parse_env("LOYALTY_EXPIRY_SWEEP_SECS", &secs)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.batching.max_batch_size == 0 {
            return Err(crate::Error::Config(
                "batching.max_batch_size must be at least 1".to_string(),
            ));
        }

        if self.batching.enabled && self.batching.batch_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "batching.batch_timeout_ms must be positive".to_string(),
            ));
        }

        if self.redemption.min_points < 1 || self.redemption.points_per_unit < 1 {
            return Err(crate::Error::Config(
                "redemption.min_points and redemption.points_per_unit must be positive".to_string(),
            ));
        }

        if self.redemption.discount_per_unit < Decimal::ZERO {
            return Err(crate::Error::Config(
                "redemption.discount_per_unit must not be negative".to_string(),
            ));
        }

        if self.earning.currency_units_per_point <= Decimal::ZERO {
            return Err(crate::Error::Config(
                "earning.currency_units_per_point must be positive".to_string(),
            ));
        }

        if self.earning.points_ttl_days.is_some_and(|days| days < 1) {
            return Err(crate::Error::Config(
                "earning.points_ttl_days must be at least 1".to_string(),
            ));
        }

        if self.earning.points_ttl_days.is_some_and(|days| days > MAX_POINTS_TTL_DAYS) {
            return Err(crate::Error::Config(format!(
                "earning.points_ttl_days must be at most {}",
                MAX_POINTS_TTL_DAYS
            )));
        }

        if self.expiry.enabled && self.expiry.sweep_interval_secs == 0 {
            return Err(crate::Error::Config(
                "expiry.sweep_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| crate::Error::Config(format!("Invalid value for {}: {}", name, value)))
}
