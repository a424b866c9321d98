//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/opptrace/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/opptrace/` (~/.config/opptrace/)
//! - State/Logs: `$XDG_STATE_HOME/opptrace/` (~/.local/state/opptrace/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Backend connection
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Logbook lookups
    #[serde(default)]
    pub logbook: LogbookConfig,
}

/// Backend server configuration
///
/// Only the REST API is reached from here; the socket connection belongs to
/// whatever embeds the library.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base URL (e.g., `http://homeassistant.local:8123`)
    pub url: Option<String>,

    /// Long-lived access token
    pub token: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl ServerConfig {
    /// Check if a server URL and token are both present
    pub fn is_ready(&self) -> bool {
        self.url.is_some() && self.token.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("server.url is required".to_string()))?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server.url must start with http:// or https://, got {:?}",
                url
            )));
        }
        if self.token.is_none() {
            return Err(Error::Config("server.token is required".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "server.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Logbook configuration
#[derive(Debug, Deserialize)]
pub struct LogbookConfig {
    /// Cache date-range lookups (context lookups are never cached)
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            cache_enabled: default_cache_enabled(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/opptrace/config.toml` (~/.config/opptrace/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("opptrace").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/opptrace/` (~/.local/state/opptrace/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("opptrace")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("opptrace.log")
    }
}
