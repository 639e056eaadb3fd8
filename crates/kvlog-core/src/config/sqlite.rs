use super::{default_queue_capacity, validate_queue_capacity};
use crate::error::{LogError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the SQLite-backed transaction log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SqliteLogConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Name of the events table
    /// Default: "transactions"
    #[serde(default = "default_table")]
    pub table: String,

    /// Capacity of the write queue before producers block
    /// Default: 16
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Enable WAL mode
    /// Default: true
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// SQLite synchronous mode
    #[serde(default)]
    pub synchronous: SynchronousMode,

    /// Rows fetched per query while replaying
    /// Default: 1024
    #[serde(default = "default_replay_batch_size")]
    pub replay_batch_size: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    /// Full fsync (safest, slowest)
    #[default]
    Full,
    /// fsync at critical moments
    Normal,
    /// No fsync (fastest, least safe)
    Off,
}

impl SynchronousMode {
    pub fn as_pragma(self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Off => "OFF",
        }
    }
}

fn default_table() -> String {
    "transactions".to_string()
}

fn default_wal_mode() -> bool {
    true
}

fn default_replay_batch_size() -> usize {
    1024
}

impl SqliteLogConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: default_table(),
            queue_capacity: default_queue_capacity(),
            wal_mode: default_wal_mode(),
            synchronous: SynchronousMode::default(),
            replay_batch_size: default_replay_batch_size(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_wal_mode(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    pub fn with_synchronous(mut self, synchronous: SynchronousMode) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn with_replay_batch_size(mut self, replay_batch_size: usize) -> Self {
        self.replay_batch_size = replay_batch_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_queue_capacity(self.queue_capacity)?;

        if self.replay_batch_size == 0 {
            return Err(LogError::Config("replay_batch_size must be at least 1".into()));
        }

        // The table name is interpolated into SQL, so keep it to a plain identifier
        let valid_table = !self.table.is_empty()
            && !self.table.starts_with(|c: char| c.is_ascii_digit())
            && self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_table {
            return Err(LogError::Config(format!(
                "invalid table name {:?}: use letters, digits and underscores",
                self.table
            )));
        }

        Ok(())
    }
}
