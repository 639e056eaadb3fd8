pub mod file;
pub mod sqlite;

pub use file::FileLogConfig;
pub use sqlite::{SqliteLogConfig, SynchronousMode};

use crate::error::{LogError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Backend selection, loadable from a JSON document such as
/// `{"backend": "file", "path": "transaction.log"}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum LogConfig {
    File(FileLogConfig),
    Sqlite(SqliteLogConfig),
}

impl LogConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: LogConfig = serde_json::from_str(&data).map_err(|e| {
            LogError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            LogConfig::File(cfg) => cfg.validate(),
            LogConfig::Sqlite(cfg) => cfg.validate(),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        match self {
            LogConfig::File(cfg) => cfg.queue_capacity,
            LogConfig::Sqlite(cfg) => cfg.queue_capacity,
        }
    }

    pub fn with_queue_capacity(self, queue_capacity: usize) -> Self {
        match self {
            LogConfig::File(cfg) => LogConfig::File(cfg.with_queue_capacity(queue_capacity)),
            LogConfig::Sqlite(cfg) => LogConfig::Sqlite(cfg.with_queue_capacity(queue_capacity)),
        }
    }
}

pub(crate) fn default_queue_capacity() -> usize {
    16
}

pub(crate) fn validate_queue_capacity(queue_capacity: usize) -> Result<()> {
    if queue_capacity == 0 {
        return Err(LogError::Config("queue_capacity must be at least 1".into()));
    }
    Ok(())
}
