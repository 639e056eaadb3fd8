use super::{default_queue_capacity, validate_queue_capacity};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the file-backed transaction log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileLogConfig {
    /// Path to the log file (created if absent)
    pub path: PathBuf,

    /// Capacity of the write queue before producers block
    /// Default: 16
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// fsync after every appended line
    ///
    /// When `false` each line is still flushed to the OS, so a process crash
    /// loses nothing, but a power loss may drop the tail of the log.
    /// Default: false
    #[serde(default)]
    pub sync_on_write: bool,
}

impl FileLogConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            queue_capacity: default_queue_capacity(),
            sync_on_write: false,
        }
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_sync_on_write(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_queue_capacity(self.queue_capacity)
    }
}
