//! CLI configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use whdbg_common::constants;

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("whdbg")
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".whdbg")
    }
}

/// Get the config file path
pub fn config_file() -> PathBuf {
    config_dir().join("config.yml")
}

/// Get the logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Ensure all config directories exist
pub fn ensure_dirs() -> Result<()> {
    fs::create_dir_all(config_dir()).context("Failed to create config directory")?;
    fs::create_dir_all(logs_dir()).context("Failed to create logs directory")?;
    Ok(())
}

/// Which backend deployment to talk to
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Local,
}

impl Environment {
    pub fn server_url(&self) -> &'static str {
        match self {
            Environment::Production => constants::PRODUCTION_SERVER_URL,
            Environment::Local => constants::LOCAL_SERVER_URL,
        }
    }
}

/// Main configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend deployment (default: production)
    #[serde(default)]
    pub environment: Environment,

    /// Explicit backend URL, takes precedence over `environment`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Timeout for override pushes, in seconds
    #[serde(default = "default_push_timeout_secs")]
    pub push_timeout_secs: u64,

    /// Longest wait between reconnection attempts, in seconds
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
}

fn default_push_timeout_secs() -> u64 {
    constants::PUSH_TIMEOUT_SECONDS
}

fn default_reconnect_max_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            server_url: None,
            push_timeout_secs: default_push_timeout_secs(),
            reconnect_max_secs: default_reconnect_max_secs(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load() -> Result<Self> {
        let path = config_file();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(config_file(), content).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply command line overrides. An explicit environment discards a saved
    /// server URL; an explicit server URL wins over both.
    pub fn with_overrides(
        mut self,
        environment: Option<Environment>,
        server_url: Option<String>,
    ) -> Self {
        if let Some(environment) = environment {
            self.environment = environment;
            self.server_url = None;
        }
        if let Some(url) = server_url {
            self.server_url = Some(url);
        }
        self
    }

    /// HTTP(S) base URL of the backend
    pub fn server_url(&self) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| self.environment.server_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Get WebSocket URL from server URL
    pub fn websocket_url(&self) -> String {
        let server_url = self.server_url();
        let ws_scheme = if server_url.starts_with("https://") {
            "wss"
        } else {
            "ws"
        };
        let host = server_url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        format!("{}://{}", ws_scheme, host)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs.max(1))
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_secs.max(1))
    }
}

/// Public URL webhooks for `listener` are sent to
pub fn listener_url(server_url: &str, listener: &str) -> String {
    match server_url.split_once("://") {
        Some((scheme, host)) => format!("{}://{}.{}", scheme, listener, host.trim_end_matches('/')),
        None => format!("https://{}.{}", listener, server_url),
    }
}
