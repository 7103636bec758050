//! Configuration management for the whirlnet server.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/whirlnet/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accounts::default_accounts_path;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bind must be a socket address like 0.0.0.0:25565, got {0}")]
    InvalidBindAddress(String),

    #[error("default_rows and default_columns must be greater than 0, got {rows}x{columns}")]
    InvalidTerminalSize { rows: u16, columns: u16 },

    #[error("inbox_capacity must be greater than 0 when set")]
    InvalidInboxCapacity,

    #[error("max_attempts must be greater than 0")]
    InvalidMaxAttempts,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Environment variable overriding `server.bind`.
pub const ENV_BIND: &str = "WHIRLNET_BIND";

/// Environment variable overriding `logging.log_level`.
pub const ENV_LOG_LEVEL: &str = "WHIRLNET_LOG_LEVEL";

/// Main configuration structure for the whirlnet server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Listener and greeting settings.
    pub server: ServerConfig,

    /// Terminal defaults used until a client reports its size.
    pub terminal: TerminalConfig,

    /// Shell settings.
    pub shell: ShellConfig,

    /// Account storage and login settings.
    pub accounts: AccountsConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Listener and greeting settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: String,

    /// Message of the day shown on the first screen.
    pub motd: String,

    /// Send telnet option negotiation (echo, suppress go-ahead, NAWS) on connect.
    pub telnet_negotiation: bool,
}

/// Terminal defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalConfig {
    pub default_rows: u16,
    pub default_columns: u16,
}

/// Shell settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ShellConfig {
    /// Bound on queued messages per shell. Unset means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbox_capacity: Option<usize>,
}

/// Account storage and login settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccountsConfig {
    /// Path of the JSON account file.
    pub path: PathBuf,

    /// Failed login or signup attempts allowed per connection.
    pub max_attempts: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Also write logs to this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:25565".to_string(),
            motd: "welcome to whirlnet.".to_string(),
            telnet_negotiation: true,
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            default_rows: terminal::DEFAULT_ROWS,
            default_columns: terminal::DEFAULT_COLUMNS,
        }
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            path: default_accounts_path(),
            max_attempts: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("whirlnet")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported variables:
    /// - WHIRLNET_BIND: Override the listen address
    /// - WHIRLNET_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var(ENV_BIND) {
            if !bind.is_empty() {
                tracing::info!(bind = %bind, "Overriding bind address from environment");
                self.server.bind = bind;
            }
        }

        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.is_empty() {
                tracing::info!(level = %level, "Overriding log_level from environment");
                self.logging.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        let TerminalConfig {
            default_rows: rows,
            default_columns: columns,
        } = self.terminal;
        if rows == 0 || columns == 0 {
            return Err(ConfigError::InvalidTerminalSize { rows, columns });
        }

        if self.shell.inbox_capacity == Some(0) {
            return Err(ConfigError::InvalidInboxCapacity);
        }

        if self.accounts.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts);
        }

        let level = self.logging.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.log_level.clone()));
        }

        Ok(())
    }

    /// The parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind.clone()))
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
