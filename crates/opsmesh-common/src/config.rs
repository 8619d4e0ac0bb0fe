//! ---
//! mesh_section: "01-core-functionality"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Shared primitives and utilities for the OpsMesh services."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use thiserror::Error;
use tracing::debug;

use crate::logging::LogFormat;

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> Vec<u64> {
    vec![200, 500, 1000]
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9898"
        .parse()
        .expect("valid default metrics address")
}

/// Validation failures that must refuse startup. These are fatal: running
/// half-configured against the backing store is worse than not starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The remote store identifier is absent or blank.
    #[error("store.spreadsheet_id must be set to the backing spreadsheet identifier")]
    MissingSpreadsheetId,
    /// No credentials were supplied for the backing store.
    #[error("store.credentials_path must point to the service-account credentials file")]
    MissingCredentials,
    /// A gateway tuning knob was set to a value that disables the protection it provides.
    #[error("gateway.{field} must be at least 1 (got {value})")]
    InvalidGatewayBound {
        /// Offending field name.
        field: &'static str,
        /// Configured value.
        value: u64,
    },
    /// The cache TTL was set to zero, which would turn every lookup into a storage round trip.
    #[error("cache.ttl_seconds must be greater than zero")]
    ZeroCacheTtl,
}

/// Primary configuration object for the OpsMesh access services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Remote tabular store coordinates and credentials.
    #[serde(default)]
    pub store: StoreConfig,
    /// Circuit breaker and retry tuning for the storage gateway.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Permission cache tuning.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Tracing output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Prometheus exposition configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    /// Parsed and validated configuration.
    pub config: AppConfig,
    /// Path the configuration was read from.
    pub source: PathBuf,
}

impl AppConfig {
    /// Environment variable overriding the configuration search path.
    pub const ENV_CONFIG_PATH: &'static str = "OPSMESH_CONFIG";

    /// Load configuration from disk, respecting the `OPSMESH_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants. Called during load; callers that build
    /// configuration programmatically must call it themselves before startup.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.store.validate()?;
        self.gateway.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Coordinates of the remote tabular store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Identifier of the backing spreadsheet document.
    #[serde(default)]
    pub spreadsheet_id: String,
    /// Path to the service-account credentials used by the protocol client.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// Optional endpoint override (test servers, regional endpoints).
    #[serde(default)]
    pub api_endpoint: Option<String>,
}

impl StoreConfig {
    /// Validate that the store is reachable in principle.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.spreadsheet_id.trim().is_empty() {
            return Err(ConfigError::MissingSpreadsheetId);
        }
        if self.credentials_path.is_none() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(())
    }
}

/// Circuit breaker and retry tuning for the storage gateway.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Consecutive failures that trip the breaker from CLOSED to OPEN.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Cool-down the breaker waits in OPEN before admitting a probe.
    #[serde(default = "default_cooldown")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cooldown: Duration,
    /// Total attempts per admitted call (first try plus retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff delays in milliseconds applied between attempts, in order.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: Vec<u64>,
    /// Per-attempt timeout for a single remote call.
    #[serde(default = "default_call_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub call_timeout: Duration,
}

impl GatewayConfig {
    /// Validate gateway bounds.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidGatewayBound {
                field: "failure_threshold",
                value: 0,
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidGatewayBound {
                field: "max_attempts",
                value: 0,
            });
        }
        Ok(())
    }

    /// Materialize the configured backoff schedule.
    pub fn backoff(&self) -> Vec<Duration> {
        self.retry_backoff_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown: default_cooldown(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            call_timeout: default_call_timeout(),
        }
    }
}

/// Permission cache tuning.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for a resolved permission set.
    #[serde(default = "default_cache_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub ttl: Duration,
}

impl CacheConfig {
    /// Validate cache bounds.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::ZeroCacheTtl);
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
        }
    }
}

/// Tracing output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory receiving rolling log files.
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Stdout format.
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Override for the log file prefix (defaults to the service name).
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Prometheus exposition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metric families are registered at all.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Listen address for the exposition endpoint run by the host process.
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_toml() -> &'static str {
        r#"
        [store]
        spreadsheet_id = "sheet-ops-prod"
        credentials_path = "secrets/service-account.json"

        [gateway]
        failure_threshold = 5
        cooldown = 60

        [cache]
        ttl = 300
        "#
    }

    #[test]
    fn parses_and_validates_full_config() {
        let config: AppConfig = valid_toml().parse().unwrap();
        assert_eq!(config.store.spreadsheet_id, "sheet-ops-prod");
        assert_eq!(config.gateway.failure_threshold, 5);
        assert_eq!(config.gateway.cooldown, Duration::from_secs(60));
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.gateway.backoff()[0], Duration::from_millis(200));
    }

    #[test]
    fn refuses_missing_spreadsheet_id() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSpreadsheetId)
        ));
    }

    #[test]
    fn refuses_missing_credentials() {
        let mut config = AppConfig::default();
        config.store.spreadsheet_id = "sheet-ops-prod".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredentials)
        ));
    }

    #[test]
    fn refuses_zero_gateway_bounds() {
        let mut config = AppConfig::default();
        config.store.spreadsheet_id = "sheet-ops-prod".into();
        config.store.credentials_path = Some(PathBuf::from("creds.json"));
        config.gateway.failure_threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGatewayBound {
                field: "failure_threshold",
                ..
            })
        ));
    }

    #[test]
    fn refuses_zero_cache_ttl() {
        let mut config = AppConfig::default();
        config.store.spreadsheet_id = "sheet-ops-prod".into();
        config.store.credentials_path = Some(PathBuf::from("creds.json"));
        config.cache.ttl = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCacheTtl)));
    }

    #[test]
    fn env_override_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opsmesh.toml");
        std::fs::write(&path, valid_toml()).unwrap();
        std::env::set_var(AppConfig::ENV_CONFIG_PATH, &path);
        let loaded = AppConfig::load_with_source(&["missing.toml"]).unwrap();
        std::env::remove_var(AppConfig::ENV_CONFIG_PATH);
        assert_eq!(loaded.source, path);
    }
}
