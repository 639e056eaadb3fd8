//! File-based transaction log
//!
//! Persists events as tab-separated lines in a single append-only file:
//!
//! ```text
//! 1	2	a	1
//! 2	2	b	2
//! 3	1	a
//! ```
//!
//! Features:
//! - Sequences assigned client-side by an in-memory counter, restored on replay
//! - One writer thread per log, each line flushed as it is appended
//! - Optional fsync per line (`sync_on_write`)
//! - Replay rejects corrupt lines, torn tails and non-increasing sequences

pub mod codec;
mod store;

pub use store::FileTransactionLog;
