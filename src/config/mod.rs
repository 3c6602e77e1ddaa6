//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub appearance: AppearanceConfig,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Server offered when the address prompt is left empty
    pub default_server: String,

    /// Identity sent to a channel server when the username prompt is left empty
    pub default_username: String,

    /// How long to wait for the server's first message when detecting its type
    pub handshake_timeout_secs: u64,

    /// How long to wait for the peer to acknowledge a close after `/quit`
    pub close_grace_secs: u64,

    /// Hosts that are always reached over `wss://`
    pub secure_hosts: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_server: "ws://localhost:8765".to_string(),
            default_username: "Anonymous".to_string(),
            handshake_timeout_secs: 3,
            close_grace_secs: 2,
            secure_hosts: vec!["blockchain.info".to_string()],
        }
    }
}

/// Appearance settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceConfig {
    /// Color-code output lines by kind
    pub colors: bool,

    /// Annotate unrecognized JSON with streaming API hints (heartbeats, sequence numbers)
    pub api_hints: bool,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            colors: true,
            api_hints: true,
        }
    }
}

impl Config {
    /// Load config from the default location, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a specific file, or return defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tether")
            .join("config.toml")
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.general.handshake_timeout_secs)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_secs(self.general.close_grace_secs)
    }
}
