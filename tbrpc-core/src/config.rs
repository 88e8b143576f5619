//! Configuration management for tbrpc
//!
//! Config files are stored in platform-appropriate locations:
//! - Linux: ~/.config/tbrpc/
//! - macOS: ~/Library/Application Support/tbrpc/
//! - Windows: %APPDATA%\tbrpc\
//!
//! `config.toml` holds the settings below; `state.toml` next to it holds the
//! session, selected device and favorites. RPC history goes to the data dir.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Config directory not found")]
    NoDirFound,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
}

/// Client-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server used by `login` when none is given
    pub default_server_url: Option<String>,

    /// Timeout for REST calls other than RPC, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Two-way RPC timeout when none is given, in milliseconds
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,

    /// Devices per page when listing
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Delay before returning to login after the session expires
    #[serde(default = "default_redirect_delay")]
    pub redirect_delay_ms: u64,

    /// Override for the state file location
    pub state_file: Option<PathBuf>,

    /// Override for the RPC history location
    pub log_file: Option<PathBuf>,

    /// Override for the RPC templates location
    pub templates_file: Option<PathBuf>,
}

// Default value functions
fn default_request_timeout() -> u64 {
    10_000
}
fn default_rpc_timeout() -> u64 {
    crate::DEFAULT_RPC_TIMEOUT_MS
}
fn default_page_size() -> u32 {
    crate::DEFAULT_PAGE_SIZE
}
fn default_redirect_delay() -> u64 {
    crate::SESSION_EXPIRED_REDIRECT_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_server_url: None,
            request_timeout_ms: default_request_timeout(),
            rpc_timeout_ms: default_rpc_timeout(),
            page_size: default_page_size(),
            redirect_delay_ms: default_redirect_delay(),
            state_file: None,
            log_file: None,
            templates_file: None,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

impl Config {
    /// Get config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("tbrpc"))
            .ok_or(ConfigError::NoDirFound)
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from specific path
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Session/device/favorites state file
    pub fn state_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.client.state_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("state.toml")),
        }
    }

    /// RPC history file
    pub fn log_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.client.log_file {
            Some(path) => Ok(path.clone()),
            None => dirs::data_dir()
                .map(|p| p.join("tbrpc").join("logs").join("rpc-debug.log"))
                .ok_or(ConfigError::NoDirFound),
        }
    }

    pub fn templates_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.client.templates_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("templates.json")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.client.page_size, crate::DEFAULT_PAGE_SIZE);
        assert_eq!(config.client.rpc_timeout_ms, 5000);
        assert_eq!(config.client.redirect_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.client.default_server_url = Some("https://tb.example.com".into());
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[client]"));

        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(
            parsed.client.default_server_url.as_deref(),
            Some("https://tb.example.com")
        );
        assert_eq!(parsed.client.request_timeout_ms, 10_000);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config = toml::from_str("[client]\npage_size = 25\n").unwrap();
        assert_eq!(parsed.client.page_size, 25);
        assert_eq!(parsed.client.rpc_timeout_ms, 5000);
        assert!(parsed.client.log_file.is_none());
    }

    #[test]
    fn test_path_overrides() {
        let mut config = Config::default();
        config.client.state_file = Some(PathBuf::from("/tmp/tbrpc/state.toml"));
        config.client.log_file = Some(PathBuf::from("/tmp/tbrpc/rpc.log"));
        assert_eq!(config.state_path().unwrap(), PathBuf::from("/tmp/tbrpc/state.toml"));
        assert_eq!(config.log_path().unwrap(), PathBuf::from("/tmp/tbrpc/rpc.log"));
    }
}
