//! Server Configuration
//!
//! Layered: built-in defaults, then an optional config file, then
//! `STATION__*` environment variables (e.g. `STATION__SERVER__WORKERS=8`).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config file read when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "station.toml";

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "STATION_CONFIG";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Full server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// RPC listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: String,
    /// Requests served concurrently; later ones wait for a slot
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5440".to_string(),
            workers: 3,
        }
    }
}

/// Cluster settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Replica nodes in contact order
    pub contact_points: Vec<String>,
    /// Keyspace holding the `stations` table
    pub keyspace: String,
    /// Per-request storage deadline in milliseconds (0 = none)
    pub request_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            contact_points: vec!["db-1".to_string(), "db-2".to_string(), "db-3".to_string()],
            keyspace: "weather".to_string(),
            request_timeout_ms: 0,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load from `path` (or `$STATION_CONFIG`, or `station.toml`) and the environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let builder = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(environment());

        Self::from_builder(builder)
    }

    /// Build and validate from prepared sources
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.workers == 0 {
            return Err(ConfigError::Invalid("server.workers must be at least 1".to_string()));
        }
        if self.storage.contact_points.is_empty() {
            return Err(ConfigError::Invalid(
                "storage.contact_points must not be empty".to_string(),
            ));
        }
        if self.storage.keyspace.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.keyspace must not be empty".to_string()));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown logging.level: {}",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// `STATION__SECTION__KEY` variables; contact points are comma separated
fn environment() -> Environment {
    Environment::with_prefix("STATION")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("storage.contact_points")
        .try_parsing(true)
}
