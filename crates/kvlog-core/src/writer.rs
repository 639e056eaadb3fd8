//! Background writer shared by every backend
//!
//! A [`LogWriter`] owns one dedicated thread that drains a bounded FIFO queue
//! into an [`EventSink`]. All persistence for a log happens on that thread, so
//! the persisted order is exactly the enqueue order.
//!
//! Failure policy is fail-stop: the first append or sync error is published
//! once on the [`ErrorStream`], the thread exits, and every later write fails
//! fast with [`LogError::Failed`].

use crate::error::{LogError, Result};
use crate::event_log::EventSink;
use crate::observe;
use crate::types::{Mutation, Sequence};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

enum Command {
    Append {
        mutation: Mutation,
        ack: SyncSender<Result<Sequence>>,
    },
    Sync {
        ack: SyncSender<Result<Sequence>>,
    },
}

#[derive(Debug, Default)]
struct WriterState {
    failed: AtomicBool,
    last_sequence: AtomicU64,
}

impl WriterState {
    fn stopped_error(&self) -> LogError {
        if self.failed.load(Ordering::SeqCst) {
            LogError::Failed
        } else {
            LogError::Closed
        }
    }
}

/// Stream of asynchronous write errors
///
/// Unbounded: a burst of failures is never dropped. Clones share the same
/// underlying stream, so each error is observed once.
#[derive(Clone)]
pub struct ErrorStream {
    rx: Arc<Mutex<Receiver<LogError>>>,
}

impl ErrorStream {
    /// Next pending error, if any, without blocking
    pub fn try_next(&self) -> Option<LogError> {
        self.rx.lock().try_recv().ok()
    }

    /// Wait up to `timeout` for the next error
    pub fn next_timeout(&self, timeout: Duration) -> Option<LogError> {
        self.rx.lock().recv_timeout(timeout).ok()
    }

    /// Take every pending error
    pub fn drain(&self) -> Vec<LogError> {
        self.rx.lock().try_iter().collect()
    }
}

/// Handle to the sequence a queued event will be persisted under
///
/// Dropping the receipt is fine; the write still happens.
pub struct WriteReceipt {
    rx: Receiver<Result<Sequence>>,
    state: Arc<WriterState>,
}

impl WriteReceipt {
    /// Block until the event is persisted and return its sequence
    pub fn wait(self) -> Result<Sequence> {
        match self.rx.recv() {
            Ok(result) => result,
            // Dropped unprocessed: the writer stopped before reaching it
            Err(_) => Err(self.state.stopped_error()),
        }
    }
}

/// A running transaction log: accepts writes and persists them in order
pub struct LogWriter {
    backend: &'static str,
    queue: Mutex<Option<SyncSender<Command>>>,
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
    state: Arc<WriterState>,
    errors: ErrorStream,
}

impl LogWriter {
    /// Start the writer thread for `sink`
    pub fn spawn(
        backend: &'static str,
        sink: Box<dyn EventSink>,
        queue_capacity: usize,
    ) -> Result<Self> {
        if queue_capacity == 0 {
            return Err(LogError::Config("queue_capacity must be at least 1".into()));
        }

        let state = Arc::new(WriterState::default());
        state
            .last_sequence
            .store(sink.last_sequence(), Ordering::SeqCst);

        let (queue_tx, queue_rx) = mpsc::sync_channel(queue_capacity);
        let (err_tx, err_rx) = mpsc::channel();

        let thread_state = state.clone();
        let handle = std::thread::Builder::new()
            .name(format!("kvlog-writer-{}", backend))
            .spawn(move || writer_loop(backend, sink, queue_rx, thread_state, err_tx))?;

        tracing::info!(
            backend,
            queue_capacity,
            last_sequence = state.last_sequence.load(Ordering::SeqCst),
            "Transaction log writer started"
        );

        Ok(Self {
            backend,
            queue: Mutex::new(Some(queue_tx)),
            handle: Mutex::new(Some(handle)),
            state,
            errors: ErrorStream {
                rx: Arc::new(Mutex::new(err_rx)),
            },
        })
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Enqueue a Put event
    ///
    /// Blocks only while the queue is full.
    pub fn write_put(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<WriteReceipt> {
        self.write(Mutation::put(key, value))
    }

    /// Enqueue a Delete event
    pub fn write_delete(&self, key: impl Into<String>) -> Result<WriteReceipt> {
        self.write(Mutation::delete(key))
    }

    /// Enqueue a mutation
    pub fn write(&self, mutation: Mutation) -> Result<WriteReceipt> {
        let (ack, rx) = mpsc::sync_channel(1);
        self.enqueue(Command::Append { mutation, ack })?;
        Ok(WriteReceipt {
            rx,
            state: self.state.clone(),
        })
    }

    /// Wait until everything enqueued so far is durable
    ///
    /// Returns the last persisted sequence.
    pub fn flush(&self) -> Result<Sequence> {
        let (ack, rx) = mpsc::sync_channel(1);
        self.enqueue(Command::Sync { ack })?;
        match rx.recv() {
            Ok(result) => result,
            Err(_) => Err(self.state.stopped_error()),
        }
    }

    /// Asynchronous write errors
    pub fn errors(&self) -> ErrorStream {
        self.errors.clone()
    }

    /// Whether the writer stopped after a write failure
    pub fn is_failed(&self) -> bool {
        self.state.failed.load(Ordering::SeqCst)
    }

    /// Last sequence persisted by this writer (or recovered at startup)
    pub fn last_sequence(&self) -> Sequence {
        self.state.last_sequence.load(Ordering::SeqCst)
    }

    /// Stop accepting writes and release the durable resource
    ///
    /// Events already queued are written before the resource is released,
    /// unless the writer has failed. Takes `&self` so a writer shared behind
    /// an `Arc` can be closed; calling `close` again is a no-op.
    pub fn close(&self) -> Result<()> {
        // Dropping the last sender ends the writer loop once the queue drains
        drop(self.queue.lock().take());

        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };

        let result = handle
            .join()
            .map_err(|_| LogError::InvalidState("transaction log writer panicked".into()))?;

        tracing::info!(
            backend = self.backend,
            last_sequence = self.last_sequence(),
            "Transaction log closed"
        );
        result
    }

    fn enqueue(&self, command: Command) -> Result<()> {
        // Fail fast instead of blocking on a queue nobody drains
        if self.state.failed.load(Ordering::SeqCst) {
            return Err(LogError::Failed);
        }

        let queue = self.queue.lock().clone().ok_or(LogError::Closed)?;
        queue
            .send(command)
            .map_err(|_| self.state.stopped_error())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(backend = self.backend, "Failed to close transaction log on drop: {}", e);
        }
    }
}

fn writer_loop(
    backend: &'static str,
    mut sink: Box<dyn EventSink>,
    queue: Receiver<Command>,
    state: Arc<WriterState>,
    errors: Sender<LogError>,
) -> Result<()> {
    let fail = |error: LogError| {
        state.failed.store(true, Ordering::SeqCst);
        observe::record_write_failure();
        tracing::error!(backend, "Transaction log write failed, writer stopping: {}", error);
        let _ = errors.send(error);
    };

    for command in queue.iter() {
        match command {
            Command::Append { mutation, ack } => {
                let start = Instant::now();
                match sink.append(&mutation) {
                    Ok(sequence) => {
                        state.last_sequence.store(sequence, Ordering::SeqCst);
                        observe::record_append(start.elapsed());
                        tracing::debug!(backend, sequence, kind = %mutation.kind, key = %mutation.key, "Appended event");
                        let _ = ack.send(Ok(sequence));
                    }
                    Err(e) => {
                        fail(e);
                        let _ = ack.send(Err(LogError::Failed));
                        break;
                    }
                }
            }
            Command::Sync { ack } => match sink.sync() {
                Ok(()) => {
                    let _ = ack.send(Ok(sink.last_sequence()));
                }
                Err(e) => {
                    fail(e);
                    let _ = ack.send(Err(LogError::Failed));
                    break;
                }
            },
        }
    }

    // Unblock producers waiting on a full queue; anything still queued is dropped
    drop(queue);

    sink.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Event;
    use std::thread;

    #[derive(Default)]
    struct RecordingSink {
        persisted: Arc<Mutex<Vec<Event>>>,
        last: Sequence,
        fail_at: Option<Sequence>,
        gate: Option<Receiver<()>>,
    }

    impl EventSink for RecordingSink {
        fn append(&mut self, mutation: &Mutation) -> Result<Sequence> {
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            let sequence = self.last + 1;
            if self.fail_at == Some(sequence) {
                return Err(LogError::Io(std::io::Error::other("disk full")));
            }
            self.persisted
                .lock()
                .push(mutation.clone().into_event(sequence));
            self.last = sequence;
            Ok(sequence)
        }

        fn sync(&mut self) -> Result<()> {
            Ok(())
        }

        fn last_sequence(&self) -> Sequence {
            self.last
        }

        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn recording_writer(sink: RecordingSink, capacity: usize) -> LogWriter {
        LogWriter::spawn("test", Box::new(sink), capacity).unwrap()
    }

    #[test]
    fn test_receipts_report_assigned_sequences() {
        let persisted = Arc::new(Mutex::new(Vec::new()));
        let writer = recording_writer(
            RecordingSink {
                persisted: persisted.clone(),
                ..Default::default()
            },
            16,
        );

        let a = writer.write_put("a", "1").unwrap();
        let b = writer.write_put("b", "2").unwrap();
        let c = writer.write_delete("a").unwrap();

        assert_eq!(a.wait().unwrap(), 1);
        assert_eq!(b.wait().unwrap(), 2);
        assert_eq!(c.wait().unwrap(), 3);
        assert_eq!(writer.last_sequence(), 3);

        writer.close().unwrap();
        assert_eq!(
            *persisted.lock(),
            vec![
                Event::put(1, "a", "1"),
                Event::put(2, "b", "2"),
                Event::delete(3, "a"),
            ]
        );
    }

    #[test]
    fn test_close_drains_queue() {
        let persisted = Arc::new(Mutex::new(Vec::new()));
        let writer = recording_writer(
            RecordingSink {
                persisted: persisted.clone(),
                ..Default::default()
            },
            4,
        );

        for i in 0..4 {
            writer.write_put(format!("k{}", i), "v").unwrap();
        }
        writer.close().unwrap();

        assert_eq!(persisted.lock().len(), 4);
        assert!(matches!(writer.write_put("late", "v"), Err(LogError::Closed)));
        assert!(matches!(writer.flush(), Err(LogError::Closed)));
        // Second close is a no-op
        writer.close().unwrap();
    }

    #[test]
    fn test_fail_stop_emits_exactly_one_error() {
        let persisted = Arc::new(Mutex::new(Vec::new()));
        let writer = recording_writer(
            RecordingSink {
                persisted: persisted.clone(),
                fail_at: Some(3),
                ..Default::default()
            },
            16,
        );

        writer.write_put("a", "1").unwrap();
        writer.write_put("b", "2").unwrap();
        let failing = writer.write_put("c", "3").unwrap();

        assert!(matches!(failing.wait(), Err(LogError::Failed)));
        assert!(writer.is_failed());

        let errors = writer.errors();
        assert!(matches!(
            errors.next_timeout(Duration::from_secs(1)),
            Some(LogError::Io(_))
        ));
        assert!(errors.try_next().is_none());

        // Later writes fail fast and are never persisted
        assert!(matches!(writer.write_put("d", "4"), Err(LogError::Failed)));
        assert!(matches!(writer.flush(), Err(LogError::Failed)));

        writer.close().unwrap();
        assert!(errors.drain().is_empty());
        assert_eq!(persisted.lock().len(), 2);
    }

    #[test]
    fn test_concurrent_producers_get_unique_sequences() {
        let persisted = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::new(recording_writer(
            RecordingSink {
                persisted: persisted.clone(),
                ..Default::default()
            },
            16,
        ));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let writer = writer.clone();
                thread::spawn(move || {
                    let mut sequences = Vec::new();
                    for i in 0..50 {
                        let receipt = writer.write_put(format!("t{}-{}", t, i), "v").unwrap();
                        sequences.push(receipt.wait().unwrap());
                    }
                    sequences
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            let sequences = handle.join().unwrap();
            // Each producer sees its own writes in submission order
            assert!(sequences.windows(2).all(|w| w[0] < w[1]));
            all.extend(sequences);
        }

        assert_eq!(writer.flush().unwrap(), 400);
        all.sort_unstable();
        assert_eq!(all, (1..=400).collect::<Vec<_>>());
        assert_eq!(persisted.lock().len(), 400);
    }

    #[test]
    fn test_full_queue_applies_backpressure() {
        let (gate_tx, gate_rx) = mpsc::channel();
        let writer = Arc::new(recording_writer(
            RecordingSink {
                gate: Some(gate_rx),
                ..Default::default()
            },
            1,
        ));

        let producer = {
            let writer = writer.clone();
            thread::spawn(move || {
                for i in 0..4 {
                    writer.write_put(format!("k{}", i), "v").unwrap();
                }
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!producer.is_finished());

        for _ in 0..4 {
            gate_tx.send(()).unwrap();
        }
        producer.join().unwrap();
        assert_eq!(writer.flush().unwrap(), 4);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let result = LogWriter::spawn("test", Box::new(RecordingSink::default()), 0);
        assert!(matches!(result, Err(LogError::Config(_))));
    }
}
