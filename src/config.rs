//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub account: AccountConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain of local actors (e.g., "social.example.com")
    pub domain: String,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Outbound delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Per-request timeout for inbox POSTs (default: 30)
    pub timeout_seconds: u64,
    /// Maximum in-flight deliveries per dispatch (default: 10)
    pub max_concurrent: usize,
    /// User-Agent sent to remote inboxes
    pub user_agent: String,
    /// Allow followers on loopback/private addresses (local testing only)
    #[serde(default)]
    pub allow_private_targets: bool,
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_concurrent: 10,
            user_agent: default_user_agent(),
            allow_private_targets: false,
        }
    }
}

fn default_user_agent() -> String {
    format!("fedipost/{}", env!("CARGO_PKG_VERSION"))
}

/// Local account ensured at startup
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AccountConfig {
    /// Account name; the actor becomes `https://{domain}/u/{name}`
    pub name: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEDIPOST__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "data/fedipost.db")?
            .set_default("delivery.timeout_seconds", 30)?
            .set_default("delivery.max_concurrent", 10)?
            .set_default("delivery.user_agent", default_user_agent())?
            .set_default("delivery.allow_private_targets", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FEDIPOST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.server.domain.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "server.domain must not be empty".to_string(),
            ));
        }

        if self.delivery.timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "delivery.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.delivery.max_concurrent == 0 {
            return Err(crate::error::AppError::Config(
                "delivery.max_concurrent must be greater than 0".to_string(),
            ));
        }

        if self.delivery.allow_private_targets {
            tracing::warn!("Delivery to loopback/private addresses is enabled");
        }

        Ok(())
    }
}
