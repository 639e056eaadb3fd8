//! Transaction log traits
//!
//! Defines the interface every durable backend (file, SQLite, ...) implements.
//!
//! A backend moves through three states:
//! - **constructed**: `open()` has acquired the durable resource; the log can
//!   be replayed with [`TransactionLog::read_events`] but accepts no writes
//! - **running**: [`TransactionLog::run`] consumed the log and handed its
//!   [`EventSink`] to a background [`LogWriter`]
//! - **closed**: the writer (or the unstarted log) released the resource
//!
//! Because `run` takes `self`, a log can never be started twice and never
//! accepts live writes while a replay borrows it.

use crate::error::Result;
use crate::types::{Event, Mutation, Sequence};
use crate::writer::LogWriter;

/// Iterator over persisted events, in ascending sequence order
///
/// Yields at most one error, after which it is exhausted.
pub trait EventIterator: Iterator<Item = Result<Event>> {}

impl<T: Iterator<Item = Result<Event>>> EventIterator for T {}

/// A transaction log backend in its constructed state
pub trait TransactionLog: Send + Sized {
    /// Short backend name used in logs and thread names
    fn backend(&self) -> &'static str;

    /// Stream every persisted event in ascending sequence order
    ///
    /// Must be consumed before [`run`](Self::run) for correct recovery.
    /// Ordering is verified from the values read back; a sequence that does
    /// not strictly increase ends the stream with an error.
    fn read_events(&mut self) -> Result<Box<dyn EventIterator + '_>>;

    /// Start the background writer and switch to live-write mode
    fn run(self) -> Result<LogWriter>;

    /// Release the durable resource without ever starting the writer
    fn close(self) -> Result<()>;
}

/// The persistence step of a backend, driven by the writer thread
///
/// Calls arrive one at a time and in enqueue order.
pub trait EventSink: Send + 'static {
    /// Persist one mutation and return the sequence it was stored under
    fn append(&mut self, mutation: &Mutation) -> Result<Sequence>;

    /// Make everything appended so far durable
    fn sync(&mut self) -> Result<()>;

    /// Last sequence known to be persisted (0 for an empty log)
    fn last_sequence(&self) -> Sequence;

    /// Release the durable resource
    fn close(self: Box<Self>) -> Result<()>;
}
