use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::Path};

use crate::core::capacity::Capacity;
use crate::core::persistence::StorageType;

const DEFAULT_SYNC_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct QueueConfig {
    #[serde(default)]
    pub capacity: Capacity,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub storage_type: StorageType,
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    #[serde(default)]
    pub auto_recover: bool,
    /// Backend location for file storage.
    #[serde(default)]
    pub path: Option<String>,
    /// Backend location for database storage.
    #[serde(default)]
    pub connection_string: Option<String>,
}

fn default_sync_interval_ms() -> u64 {
    DEFAULT_SYNC_INTERVAL_MS
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::default(),
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            auto_recover: false,
            path: None,
            connection_string: None,
        }
    }
}

impl PersistenceConfig {
    /// Flush period. Never zero.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    /// The location setting relevant to the selected storage type.
    pub fn location(&self) -> Option<&str> {
        match self.storage_type {
            StorageType::Memory => None,
            StorageType::File => self.path.as_deref(),
            StorageType::Database => self.connection_string.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
    let path = path.as_ref();
    let raw: String = fs::read_to_string(path)
        .with_context(|| format!("reading queue config {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("parsing queue config {}", path.display()))?;
    Ok(config)
}
