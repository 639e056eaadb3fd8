//! SQLite-backed transaction log
//!
//! Persists events as rows of a `transactions` table:
//!
//! | column       | type                                |
//! |--------------|-------------------------------------|
//! | `sequence`   | `INTEGER PRIMARY KEY AUTOINCREMENT` |
//! | `event_type` | `INTEGER`                           |
//! | `key`        | `TEXT`                              |
//! | `value`      | `TEXT`                              |
//!
//! Key features:
//! - Sequence numbers assigned by the storage engine, never by the caller
//! - Table created on open if absent
//! - WAL mode and configurable synchronous level
//! - Replay streamed in fixed-size pages ordered by sequence

pub mod schema;
pub mod store;

pub use store::SqliteTransactionLog;
