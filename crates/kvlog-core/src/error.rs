use crate::types::Sequence;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot open transaction log: {0}")]
    Open(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corrupt record at line {line}: {reason}")]
    Corrupt { line: u64, reason: String },

    #[error("Torn record at line {line}: missing record terminator")]
    TornRecord { line: u64 },

    #[error("Transaction numbers out of sequence at line {line}: {found} follows {previous}")]
    OutOfOrder {
        line: u64,
        previous: Sequence,
        found: Sequence,
    },

    #[error("Failed to apply event {sequence} to store: {source}")]
    Apply {
        sequence: Sequence,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Transaction logger has failed and no longer accepts writes")]
    Failed,

    #[error("Transaction logger is closed")]
    Closed,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl LogError {
    /// Whether this error came from reading the log rather than from the
    /// store or the writer.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            LogError::Corrupt { .. } | LogError::TornRecord { .. } | LogError::OutOfOrder { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
