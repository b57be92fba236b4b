//! Streamgate configuration
//!
//! Config is stored in `~/.config/streamgate/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`STREAMGATE_BACKEND`, `STREAMGATE_STORAGE_ROOT`)
//! 2. Config file
//! 3. Defaults
//!
//! ```toml
//! [storage]
//! backend = "file"
//! root = "/var/tmp/streamgate"
//!
//! [conduit]
//! capacity = 65536
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::buffer::BufferKind;
use crate::error::{GatewayError, Result};
use crate::transport::DEFAULT_CAPACITY;

pub const ENV_BACKEND: &str = "STREAMGATE_BACKEND";
pub const ENV_STORAGE_ROOT: &str = "STREAMGATE_STORAGE_ROOT";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub conduit: ConduitConfig,
}

/// Where and how result buffers are kept
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Buffer implementation (file, memory)
    #[serde(default)]
    pub backend: BufferKind,

    /// Base directory for the store's private root (system temp dir if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl StorageConfig {
    pub fn base_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// In-memory conduit settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConduitConfig {
    /// Maximum unread bytes held by a memory buffer
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for ConduitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl GatewayConfig {
    /// Get the config directory path
    ///
    /// Returns `~/.config/streamgate/` on Unix, `%APPDATA%/streamgate/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("streamgate")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from the default location
    ///
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from an explicit file; the file must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| GatewayError::Config {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| GatewayError::Config {
            reason: format!("Failed to parse config file: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| GatewayError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })
    }

    /// Merge with environment variables
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(
            std::env::var(ENV_BACKEND).ok(),
            std::env::var(ENV_STORAGE_ROOT).ok(),
        )
    }

    fn with_overrides(mut self, backend: Option<String>, root: Option<String>) -> Result<Self> {
        if let Some(backend) = backend.filter(|b| !b.is_empty()) {
            self.storage.backend = backend
                .parse()
                .map_err(|reason| GatewayError::Config { reason })?;
        }
        if let Some(root) = root.filter(|r| !r.is_empty()) {
            self.storage.root = Some(PathBuf::from(root));
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.conduit.capacity == 0 {
            return Err(GatewayError::Config {
                reason: "conduit.capacity must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_file_backend() {
        let config = GatewayConfig::default();
        assert_eq!(config.storage.backend, BufferKind::File);
        assert_eq!(config.conduit.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.storage.base_dir(), std::env::temp_dir());
    }

    #[test]
    fn parse_full_file() {
        let config = GatewayConfig::parse(
            r#"
[storage]
backend = "memory"
root = "/var/tmp/sg"

[conduit]
capacity = 1024
"#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, BufferKind::Memory);
        assert_eq!(config.storage.root, Some(PathBuf::from("/var/tmp/sg")));
        assert_eq!(config.conduit.capacity, 1024);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(GatewayConfig::parse("").unwrap(), GatewayConfig::default());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let err = GatewayConfig::parse("[storage]\nbackend = \"tape\"").unwrap_err();
        assert!(matches!(err, GatewayError::Config { .. }));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = GatewayConfig::parse("[conduit]\ncapacity = 0").unwrap_err();
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn overrides_take_precedence() {
        let config = GatewayConfig::default()
            .with_overrides(Some("memory".into()), Some("/srv/results".into()))
            .unwrap();
        assert_eq!(config.storage.backend, BufferKind::Memory);
        assert_eq!(config.storage.base_dir(), PathBuf::from("/srv/results"));
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let config = GatewayConfig::default()
            .with_overrides(Some(String::new()), None)
            .unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn bad_backend_override_is_config_error() {
        let err = GatewayConfig::default()
            .with_overrides(Some("tape".into()), None)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config { .. }));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = GatewayConfig::default();
        config.storage.backend = BufferKind::Memory;
        let text = config.to_toml().unwrap();
        assert_eq!(GatewayConfig::parse(&text).unwrap(), config);
    }
}
