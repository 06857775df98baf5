//! Configuration for lamad-core

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lamad-core")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage directory for the gating database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Retry budget for certificate token generation
    #[serde(default = "default_issuance_max_attempts")]
    pub issuance_max_attempts: u32,

    /// Prefix for certificate numbers
    #[serde(default = "default_certificate_prefix")]
    pub certificate_prefix: String,

    /// Event bus channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_issuance_max_attempts() -> u32 {
    5
}

fn default_certificate_prefix() -> String {
    "LMD".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            issuance_max_attempts: 5,
            certificate_prefix: "LMD".to_string(),
            event_capacity: 1024,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get gating database path
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join("gating.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
