//! Engine configuration.

use std::path::PathBuf;

use quickdrop_discovery::DeviceType;
use quickdrop_files::DEFAULT_CHUNK_SIZE;

use crate::frame::SANE_FRAME_LENGTH;

/// Largest accepted chunk size; leaves room for the envelope inside one frame.
pub const MAX_CHUNK_SIZE: usize = SANE_FRAME_LENGTH / 2;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name shown to other devices
    pub device_name: String,

    /// Device class advertised in the endpoint info
    pub device_type: DeviceType,

    /// Where accepted files are written
    pub download_dir: PathBuf,

    /// File chunk size for outgoing transfers
    pub chunk_size: usize,

    /// Set the visibility bit so only QR-paired devices list us
    pub hidden: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            device_type: DeviceType::Computer,
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            chunk_size: DEFAULT_CHUNK_SIZE,
            hidden: false,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device name
    #[must_use]
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set the device type
    #[must_use]
    pub fn with_device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    /// Set the download directory
    #[must_use]
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Set the chunk size, clamped to `1..=MAX_CHUNK_SIZE`
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    /// Set the visibility bit
    #[must_use]
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

fn default_device_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "QuickDrop".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size, 512 * 1024);
        assert_eq!(config.device_type, DeviceType::Computer);
        assert!(!config.hidden);
        assert!(!config.device_name.is_empty());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_device_name("desk")
            .with_device_type(DeviceType::Tablet)
            .with_download_dir("/tmp/in")
            .with_hidden(true);
        assert_eq!(config.device_name, "desk");
        assert_eq!(config.device_type, DeviceType::Tablet);
        assert_eq!(config.download_dir, PathBuf::from("/tmp/in"));
        assert!(config.hidden);
    }

    #[test]
    fn test_chunk_size_clamped() {
        assert_eq!(EngineConfig::new().with_chunk_size(0).chunk_size, 1);
        assert_eq!(
            EngineConfig::new().with_chunk_size(usize::MAX).chunk_size,
            MAX_CHUNK_SIZE
        );
        assert_eq!(EngineConfig::new().with_chunk_size(4096).chunk_size, 4096);
    }
}
