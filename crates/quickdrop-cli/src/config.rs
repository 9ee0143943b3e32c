//! Configuration file for the QuickDrop CLI.

use quickdrop_core::EngineConfig;
use quickdrop_core::config::MAX_CHUNK_SIZE;
use quickdrop_discovery::DeviceType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// QuickDrop configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// How this device presents itself
    #[serde(default)]
    pub device: DeviceConfig,
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
    /// Transfer configuration
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name; the host name when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// One of `phone`, `tablet`, `computer`
    #[serde(default = "default_device_type")]
    pub device_type: String,
    /// Only show up for QR-paired senders
    #[serde(default)]
    pub hidden: bool,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Listen address for `receive`
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Where received files go; the user's download directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
    /// Chunk size in bytes for outgoing files
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Accept incoming transfers without asking
    #[serde(default)]
    pub auto_accept: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_device_type() -> String {
    "computer".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:0".to_string()
}

fn default_chunk_size() -> usize {
    512 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: None,
            device_type: default_device_type(),
            hidden: false,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            chunk_size: default_chunk_size(),
            auto_accept: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Parse a device type name
#[must_use]
pub fn parse_device_type(name: &str) -> Option<DeviceType> {
    match name.to_lowercase().as_str() {
        "phone" => Some(DeviceType::Phone),
        "tablet" => Some(DeviceType::Tablet),
        "computer" | "laptop" => Some(DeviceType::Computer),
        _ => None,
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("quickdrop/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Parse listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_listen_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.network.listen_addr.parse()?)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_listen_addr()?;

        if let Some(name) = &self.device.name {
            if name.is_empty() || name.len() > 255 {
                anyhow::bail!("Device name must be between 1 and 255 bytes");
            }
        }

        if parse_device_type(&self.device.device_type).is_none() {
            anyhow::bail!(
                "Invalid device type: {}. Must be one of: phone, tablet, computer",
                self.device.device_type
            );
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!("Chunk size must be between 1 and {MAX_CHUNK_SIZE} bytes");
        }

        Ok(())
    }

    /// Build the engine configuration. Call [`Config::validate`] first.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::default()
            .with_device_type(
                parse_device_type(&self.device.device_type).unwrap_or(DeviceType::Computer),
            )
            .with_chunk_size(self.transfer.chunk_size)
            .with_hidden(self.device.hidden);
        if let Some(name) = &self.device.name {
            engine = engine.with_device_name(name.clone());
        }
        if let Some(dir) = &self.transfer.download_dir {
            engine = engine.with_download_dir(dir.clone());
        }
        engine
    }
}
