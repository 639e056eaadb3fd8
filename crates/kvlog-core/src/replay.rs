//! Startup replay
//!
//! Rebuilds a key-value store from a transaction log before the log starts
//! accepting live writes. Replay stops on the first read or apply error, and
//! [`recover`] only starts the writer when replay completed cleanly.

use crate::error::{LogError, Result};
use crate::event_log::TransactionLog;
use crate::observe;
use crate::store::KeyValueStore;
use crate::types::{Event, EventKind, Sequence};
use crate::writer::LogWriter;
use std::time::{Duration, Instant};

/// Outcome of a completed replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub events: u64,
    pub puts: u64,
    pub deletes: u64,
    /// Sequence of the last applied event (0 for an empty log)
    pub last_sequence: Sequence,
    pub duration: Duration,
}

impl ReplayStats {
    fn record(&mut self, event: &Event) {
        self.events += 1;
        match event.kind {
            EventKind::Put => self.puts += 1,
            EventKind::Delete => self.deletes += 1,
        }
        self.last_sequence = event.sequence;
    }
}

/// Apply every persisted event to `store`, in sequence order
pub fn replay<L, S>(log: &mut L, store: &S) -> Result<ReplayStats>
where
    L: TransactionLog,
    S: KeyValueStore,
{
    let backend = log.backend();
    let start = Instant::now();
    let mut stats = ReplayStats::default();

    let outcome = apply_all(log, store, &mut stats);
    stats.duration = start.elapsed();
    observe::record_replay(stats.duration, stats.events, outcome.is_ok());

    match outcome {
        Ok(()) => {
            tracing::info!(
                backend,
                events = stats.events,
                last_sequence = stats.last_sequence,
                "Replayed transaction log in {:?}",
                stats.duration
            );
            Ok(stats)
        }
        Err(e) => {
            tracing::error!(
                backend,
                applied = stats.events,
                last_sequence = stats.last_sequence,
                "Transaction log replay aborted: {}",
                e
            );
            Err(e)
        }
    }
}

fn apply_all<L, S>(log: &mut L, store: &S, stats: &mut ReplayStats) -> Result<()>
where
    L: TransactionLog,
    S: KeyValueStore,
{
    for event in log.read_events()? {
        let event = event?;

        let applied = match event.kind {
            EventKind::Put => store.put(&event.key, &event.value),
            EventKind::Delete => store.delete(&event.key),
        };
        applied.map_err(|e| LogError::Apply {
            sequence: event.sequence,
            source: Box::new(e),
        })?;

        stats.record(&event);
    }
    Ok(())
}

/// Replay `log` into `store`, then start live writes
///
/// If replay fails the log is closed without ever starting the writer, so
/// no write can land on a store that does not reflect the full log.
pub fn recover<L, S>(mut log: L, store: &S) -> Result<(LogWriter, ReplayStats)>
where
    L: TransactionLog,
    S: KeyValueStore,
{
    match replay(&mut log, store) {
        Ok(stats) => {
            let writer = log.run()?;
            Ok((writer, stats))
        }
        Err(e) => {
            let backend = log.backend();
            if let Err(close_err) = log.close() {
                tracing::warn!(backend, "Failed to close log after aborted replay: {}", close_err);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::{EventIterator, EventSink};
    use crate::store::{MemoryStore, StoreError};
    use crate::types::Mutation;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Log whose contents are a fixed list of read results
    struct ScriptedLog {
        records: Vec<Result<Event>>,
        started: Arc<AtomicBool>,
    }

    impl ScriptedLog {
        fn new(records: Vec<Result<Event>>) -> Self {
            Self {
                records,
                started: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    struct NullSink(Sequence);

    impl EventSink for NullSink {
        fn append(&mut self, _mutation: &Mutation) -> Result<Sequence> {
            self.0 += 1;
            Ok(self.0)
        }

        fn sync(&mut self) -> Result<()> {
            Ok(())
        }

        fn last_sequence(&self) -> Sequence {
            self.0
        }

        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    impl TransactionLog for ScriptedLog {
        fn backend(&self) -> &'static str {
            "scripted"
        }

        fn read_events(&mut self) -> Result<Box<dyn EventIterator + '_>> {
            Ok(Box::new(self.records.drain(..)))
        }

        fn run(self) -> Result<LogWriter> {
            self.started.store(true, Ordering::SeqCst);
            LogWriter::spawn("scripted", Box::new(NullSink(0)), 4)
        }

        fn close(self) -> Result<()> {
            Ok(())
        }
    }

    /// Store that rejects one key
    #[derive(Default)]
    struct PickyStore {
        inner: MemoryStore,
        reject: String,
    }

    impl KeyValueStore for PickyStore {
        type Error = StoreError;

        fn put(&self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
            if key == self.reject {
                return Err(StoreError::NoSuchKey(key.to_string()));
            }
            self.inner.put(key, value)
        }

        fn get(&self, key: &str) -> std::result::Result<String, StoreError> {
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
            self.inner.delete(key)
        }
    }

    #[test]
    fn test_replay_applies_every_event_in_order() {
        let mut log = ScriptedLog::new(vec![
            Ok(Event::put(1, "a", "1")),
            Ok(Event::put(2, "b", "2")),
            Ok(Event::delete(3, "a")),
            Ok(Event::put(4, "b", "3")),
        ]);
        let store = MemoryStore::new();

        let stats = replay(&mut log, &store).unwrap();

        assert_eq!(stats.events, 4);
        assert_eq!(stats.puts, 3);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.last_sequence, 4);
        assert!(store.get("a").is_err());
        assert_eq!(store.get("b").unwrap(), "3");
    }

    #[test]
    fn test_replay_stops_at_read_error() {
        let mut log = ScriptedLog::new(vec![
            Ok(Event::put(1, "a", "1")),
            Err(LogError::OutOfOrder {
                line: 2,
                previous: 1,
                found: 1,
            }),
            Ok(Event::put(3, "c", "3")),
        ]);
        let store = MemoryStore::new();

        let err = replay(&mut log, &store).unwrap_err();

        assert!(matches!(err, LogError::OutOfOrder { line: 2, .. }));
        assert_eq!(store.get("a").unwrap(), "1");
        assert!(store.get("c").is_err());
    }

    #[test]
    fn test_replay_stops_at_apply_error() {
        let mut log = ScriptedLog::new(vec![
            Ok(Event::put(1, "a", "1")),
            Ok(Event::put(2, "bad", "2")),
            Ok(Event::put(3, "c", "3")),
        ]);
        let store = PickyStore {
            reject: "bad".into(),
            ..Default::default()
        };

        let err = replay(&mut log, &store).unwrap_err();

        assert!(matches!(err, LogError::Apply { sequence: 2, .. }));
        assert_eq!(store.inner.len(), 1);
    }

    #[test]
    fn test_recover_starts_writer_after_clean_replay() {
        let log = ScriptedLog::new(vec![Ok(Event::put(1, "a", "1"))]);
        let started = log.started.clone();
        let store = MemoryStore::new();

        let (writer, stats) = recover(log, &store).unwrap();

        assert!(started.load(Ordering::SeqCst));
        assert_eq!(stats.events, 1);
        assert_eq!(writer.write_put("b", "2").unwrap().wait().unwrap(), 1);
        writer.close().unwrap();
    }

    #[test]
    fn test_recover_never_starts_writer_after_failed_replay() {
        let log = ScriptedLog::new(vec![
            Ok(Event::put(1, "a", "1")),
            Err(LogError::Corrupt {
                line: 2,
                reason: "bad".into(),
            }),
        ]);
        let started = log.started.clone();
        let store = MemoryStore::new();

        let result = recover(log, &store);

        assert!(matches!(result, Err(LogError::Corrupt { line: 2, .. })));
        assert!(!started.load(Ordering::SeqCst));
    }
}
