//! Configuration for Mailflow

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix for configuration overrides,
/// e.g. `MAILFLOW__MAILDB__TOKEN`.
const ENV_PREFIX: &str = "MAILFLOW";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rule file configuration
    #[serde(default)]
    pub rules: RulesConfig,

    /// Action dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Mail-status service configuration
    #[serde(default)]
    pub maildb: MailDbConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Rule file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Path to the rule file (TOML or JSON)
    #[serde(default = "default_rules_path")]
    pub path: PathBuf,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: default_rules_path(),
        }
    }
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("./rules.toml")
}

/// Action dispatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum time a single event hand-off may wait for the consumer.
    /// Unset means wait indefinitely.
    pub send_timeout_ms: Option<u64>,
}

impl DispatchConfig {
    /// Send timeout as a duration
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

/// Mail-status service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailDbConfig {
    /// Report message lifecycle to the mail-status service
    #[serde(default)]
    pub enabled: bool,

    /// Base URL, without trailing slash
    #[serde(default = "default_maildb_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_maildb_timeout")]
    pub timeout_secs: u64,

    /// Retries after a transport failure
    #[serde(default = "default_maildb_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each attempt
    #[serde(default = "default_maildb_retry_delay")]
    pub retry_base_delay_ms: u64,
}

impl Default for MailDbConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_maildb_url(),
            token: None,
            timeout_secs: default_maildb_timeout(),
            max_retries: default_maildb_max_retries(),
            retry_base_delay_ms: default_maildb_retry_delay(),
        }
    }
}

fn default_maildb_url() -> String {
    "http://127.0.0.1:8081/db".to_string()
}

fn default_maildb_timeout() -> u64 {
    10
}

fn default_maildb_max_retries() -> u32 {
    4
}

fn default_maildb_retry_delay() -> u64 {
    200
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from an optional file plus `MAILFLOW__*` environment overrides.
    ///
    /// An explicit `path` must exist. Without one, the default locations are
    /// tried and skipped when absent.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = ::config::Config::builder();

        match path {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                builder = builder.add_source(::config::File::from(path).required(true));
            }
            None => {
                let paths = [
                    PathBuf::from("./mailflow.toml"),
                    PathBuf::from("/etc/mailflow/mailflow.toml"),
                ];
                for path in paths {
                    builder = builder.add_source(::config::File::from(path).required(false));
                }
            }
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }
}
