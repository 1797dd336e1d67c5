//! Runtime configuration loaded from TOML
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YardConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info,yard_tracker=debug"`.
    pub log_filter: String,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// Deleted when the store is dropped; `path` is ignored.
    pub temporary: bool,
    /// Await a durable flush after every committed batch.
    pub flush_on_commit: bool,
    pub cache_capacity_bytes: u64,
}

impl Default for YardConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("yard.db"),
            temporary: false,
            flush_on_commit: true,
            cache_capacity_bytes: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl StorageConfig {
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            flush_on_commit: false,
            ..Self::default()
        }
    }

    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }
}

impl YardConfig {
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: YardConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("failed to read config {}: {e}", path.as_ref().display())
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.log_filter.trim().is_empty(), "log_filter must not be empty");
        anyhow::ensure!(
            self.storage.temporary || !self.storage.path.as_os_str().is_empty(),
            "storage.path is required unless storage.temporary is set"
        );
        anyhow::ensure!(
            self.storage.cache_capacity_bytes > 0,
            "storage.cache_capacity_bytes must be greater than zero"
        );
        Ok(())
    }
}
