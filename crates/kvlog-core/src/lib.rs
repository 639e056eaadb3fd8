//! kvlog core: event model, logger traits and replay for a key-value
//! transaction log
//!
//! This crate defines the backend-independent half of kvlog:
//! - Event model: sequenced `Put`/`Delete` records with stable kind codes
//! - [`TransactionLog`]: the capability every durable backend implements
//! - [`LogWriter`]: one background writer per log, draining a bounded FIFO
//!   queue with fail-stop error handling
//! - Replay: rebuild a [`KeyValueStore`] from the log, and only then start
//!   accepting live writes
//!
//! Backends live in `kvlog-file` (append-only text file) and `kvlog-sqlite`
//! (SQLite table with engine-assigned sequences).

pub mod config;
pub mod error;
pub mod event_log;
pub mod journal;
pub mod observe;
pub mod replay;
pub mod store;
pub mod types;
pub mod writer;

pub use config::{FileLogConfig, LogConfig, SqliteLogConfig, SynchronousMode};
pub use error::{LogError, Result};
pub use event_log::{EventIterator, EventSink, TransactionLog};
pub use journal::JournaledStore;
pub use replay::{recover, replay, ReplayStats};
pub use store::{KeyValueStore, MemoryStore, StoreError};
pub use types::{Event, EventKind, Mutation, Sequence};
pub use writer::{ErrorStream, LogWriter, WriteReceipt};
