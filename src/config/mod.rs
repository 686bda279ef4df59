//! # Configuration Management Module
//!
//! Deployment constants for the responder, read once at startup from a TOML file.
//!
//! ## Configuration Structure
//!
//! - [`DeviceConfig`] - which radio to talk to and how
//! - [`ResponderConfig`] - trigger channel/keyword and reply wording
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshpong::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Radio: {}", config.device.address);
//!     println!("Trigger: '{}' on channel {}", config.responder.trigger_keyword, config.responder.trigger_channel);
//!
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [device]
//! address = "/dev/ttyUSB0"
//! baud_rate = 115200
//! client_name = "meshpong"
//! auto_fetch = true
//!
//! [responder]
//! trigger_channel = 1
//! trigger_keyword = "ping"
//! destination_label = "Meisterschwanden"
//! reply_marker = "Pong 🏓"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Missing optional keys fall back to the defaults above. CLI arguments override the
//! file (currently only the device address).

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub device: DeviceConfig,
    pub responder: ResponderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Serial port of the companion radio (e.g. `/dev/ttyUSB0`, `COM4`).
    pub address: String,
    /// Pairing pin for BLE transports. Not used on serial links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Name announced to the radio in the app-start handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Drain the radio's message queue automatically when it signals waiting messages.
    #[serde(default = "default_auto_fetch")]
    pub auto_fetch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponderConfig {
    /// Channel index whose messages may trigger a reply.
    pub trigger_channel: u8,
    /// Case-insensitive substring that triggers a reply.
    pub trigger_keyword: String,
    /// Place name shown in the route text ("3 hops nach <label>").
    pub destination_label: String,
    /// Text between the mention and the route info.
    #[serde(default = "default_reply_marker")]
    pub reply_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_client_name() -> String {
    "meshpong".to_string()
}

fn default_auto_fetch() -> bool {
    true
}

fn default_reply_marker() -> String {
    "Pong 🏓".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: "/dev/ttyUSB0".to_string(),
            pin: None,
            baud_rate: default_baud_rate(),
            client_name: default_client_name(),
            auto_fetch: default_auto_fetch(),
        }
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            trigger_channel: 1,
            trigger_keyword: "ping".to_string(),
            destination_label: "Meisterschwanden".to_string(),
            reply_marker: default_reply_marker(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: DeviceConfig::default(),
            responder: ResponderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LoggingConfig {
    /// Configured level as a filter; unknown names fall back to `Info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Config {
    /// Load and validate configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config = Self::from_toml(&content)
            .map_err(|e| anyhow!("Failed to load config file {}: {}", path, e))?;

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.address.trim().is_empty() {
            bail!("device.address must not be empty");
        }
        if self.device.baud_rate == 0 {
            bail!("device.baud_rate must be positive");
        }
        if self.responder.trigger_keyword.trim().is_empty() {
            bail!("responder.trigger_keyword must not be empty");
        }
        Ok(())
    }
}
