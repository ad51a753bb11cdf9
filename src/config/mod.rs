//! Application configuration loading and validation.
//!
//! Configuration is read from a TOML file. Every section is optional; the
//! relay URL can be overridden with `PERPWATCH_WS_URL`.
//!
//! # Example
//!
//! ```no_run
//! use perpwatch::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("perpwatch.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

mod logging;
mod reconnection;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

pub use logging::LoggingConfig;
pub use reconnection::ReconnectionConfig;

use crate::domain::Symbol;
use crate::error::{ConfigError, Result};

/// Environment variable overriding `connection.ws_url`.
pub const WS_URL_ENV: &str = "PERPWATCH_WS_URL";

/// Relay connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket URL of the exchange relay (`ws://` or `wss://`).
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

fn default_ws_url() -> String {
    "ws://localhost:8080/ws".into()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
        }
    }
}

/// What `perpwatch watch` follows.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Symbols whose ticker streams reprice positions between snapshots.
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    /// Seconds between risk reports.
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

fn default_report_interval_secs() -> u64 {
    5
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Controls backoff delays and circuit breaker behavior.
    #[serde(default)]
    pub reconnection: ReconnectionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML is malformed or
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Defaults with environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if an override makes the configuration invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(WS_URL_ENV) {
            if !url.trim().is_empty() {
                self.connection.ws_url = url.trim().to_string();
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.connection.ws_url.is_empty() {
            return Err(ConfigError::MissingField { field: "ws_url" }.into());
        }
        let url = Url::parse(&self.connection.ws_url).map_err(|e| ConfigError::InvalidValue {
            field: "ws_url",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidValue {
                field: "ws_url",
                reason: format!("scheme must be ws or wss, got {}", url.scheme()),
            }
            .into());
        }

        if self.reconnection.initial_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "initial_delay_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.reconnection.max_delay_ms < self.reconnection.initial_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "max_delay_ms",
                reason: "must be >= initial_delay_ms".to_string(),
            }
            .into());
        }
        let multiplier = self.reconnection.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier",
                reason: "must be >= 1.0".to_string(),
            }
            .into());
        }
        if self.reconnection.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_consecutive_failures",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.reconnection.circuit_breaker_cooldown_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "circuit_breaker_cooldown_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.watch.report_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "report_interval_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.watch.symbols.iter().any(Symbol::is_empty) {
            return Err(ConfigError::InvalidValue {
                field: "symbols",
                reason: "symbols must not be empty".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
