//! Configuration settings for the relationship graph.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations or use defaults.
    pub fn load() -> Result<Self> {
        // Try standard config locations
        let config_paths = [
            // Current directory
            PathBuf::from("config.toml"),
            PathBuf::from("sinew.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("sinew/config.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".sinew/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.storage.persist {
            if self.storage.data_dir.is_empty() {
                return Err(ConfigError::MissingField("storage.data_dir".to_string()).into());
            }
            if self.storage.graph_file.is_empty() {
                return Err(ConfigError::MissingField("storage.graph_file".to_string()).into());
            }
        }
        Ok(())
    }

    /// Expand the data directory path.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::tilde(&self.storage.data_dir);
        Ok(PathBuf::from(expanded.as_ref()))
    }

    /// Full path of the relationship snapshot, or `None` when persistence
    /// is disabled.
    pub fn graph_path(&self) -> Option<PathBuf> {
        if !self.storage.persist {
            return None;
        }
        self.data_dir()
            .ok()
            .map(|dir| dir.join(&self.storage.graph_file))
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding durable state.
    pub data_dir: String,
    /// Whether the relationship graph is persisted across restarts.
    pub persist: bool,
    /// Snapshot file name inside `data_dir`.
    pub graph_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.local/share/sinew".to_string(),
            persist: true,
            graph_file: "relationships.json".to_string(),
        }
    }
}
