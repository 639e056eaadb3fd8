use crate::codec;
use kvlog_core::{
    error::{LogError, Result},
    event_log::{EventIterator, EventSink, TransactionLog},
    types::{Event, Mutation, Sequence},
    FileLogConfig, LogWriter,
};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const BACKEND: &str = "file";

/// Sequence counter as recovered from the file
#[derive(Debug, Default)]
struct ReplayCursor {
    /// Last sequence read back
    last_sequence: Sequence,

    /// Set once a scan reached end of file without error
    complete: bool,
}

/// File-backed transaction log in its constructed state
///
/// Sequences are assigned here, by an in-memory counter that replay restores
/// from the last line of the file.
pub struct FileTransactionLog {
    config: FileLogConfig,
    file: File,
    cursor: ReplayCursor,
}

impl FileTransactionLog {
    /// Open or create the log file
    pub fn open(config: FileLogConfig) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LogError::Open(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&config.path)
            .map_err(|e| LogError::Open(format!("{}: {}", config.path.display(), e)))?;

        tracing::info!(path = %config.path.display(), "Opened file transaction log");

        Ok(Self {
            config,
            file,
            cursor: ReplayCursor::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Cut off a final line left without its terminator by an interrupted write
    ///
    /// Returns the number of bytes removed. Everything before the last
    /// complete line is left untouched.
    pub fn truncate_torn_tail(&mut self) -> Result<u64> {
        let mut reader = File::open(&self.config.path)?;
        let len = reader.metadata()?.len();
        if len == 0 {
            return Ok(0);
        }

        // Walk back from the end to the last record terminator
        let mut keep = len;
        let mut chunk = vec![0u8; 4096];
        loop {
            let start = keep.saturating_sub(chunk.len() as u64);
            let size = (keep - start) as usize;
            reader.seek(SeekFrom::Start(start))?;
            reader.read_exact(&mut chunk[..size])?;

            if let Some(pos) = chunk[..size].iter().rposition(|&b| b == b'\n') {
                keep = start + pos as u64 + 1;
                break;
            }
            if start == 0 {
                keep = 0;
                break;
            }
            keep = start;
        }

        let removed = len - keep;
        if removed > 0 {
            self.file.set_len(keep)?;
            self.file.sync_all()?;
            self.cursor = ReplayCursor::default();
            tracing::warn!(
                path = %self.config.path.display(),
                removed,
                "Truncated torn record at end of transaction log"
            );
        }
        Ok(removed)
    }
}

impl TransactionLog for FileTransactionLog {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn read_events(&mut self) -> Result<Box<dyn EventIterator + '_>> {
        let file = File::open(&self.config.path)?;
        self.cursor = ReplayCursor::default();
        Ok(Box::new(FileEventIter {
            reader: BufReader::new(file),
            cursor: &mut self.cursor,
            line: 0,
            buf: String::new(),
            done: false,
        }))
    }

    fn run(mut self) -> Result<LogWriter> {
        // Never hand out sequences without knowing where the file ends
        if !self.cursor.complete {
            tracing::debug!(path = %self.config.path.display(), "Scanning log to recover sequence counter");
            for event in self.read_events()? {
                event?;
            }
        }

        let sink = FileSink::new(
            self.file,
            self.config.path.clone(),
            self.cursor.last_sequence,
            self.config.sync_on_write,
        );
        LogWriter::spawn(BACKEND, Box::new(sink), self.config.queue_capacity)
    }

    fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Reads events line by line, enforcing strictly increasing sequences
struct FileEventIter<'a> {
    reader: BufReader<File>,
    cursor: &'a mut ReplayCursor,
    line: u64,
    buf: String,
    done: bool,
}

impl FileEventIter<'_> {
    fn read_next_event(&mut self) -> Result<Option<Event>> {
        self.buf.clear();
        let read = match self.reader.read_line(&mut self.buf) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(LogError::Corrupt {
                    line: self.line + 1,
                    reason: "invalid UTF-8".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if read == 0 {
            self.cursor.complete = true;
            return Ok(None);
        }
        self.line += 1;

        let Some(record) = self.buf.strip_suffix(codec::RECORD_TERMINATOR) else {
            tracing::warn!(line = self.line, "Transaction log ends with a torn record");
            return Err(LogError::TornRecord { line: self.line });
        };

        let event = codec::decode(record, self.line)?;

        // The counter starts at 0, so an empty log is the only place where
        // "no previous sequence" and sequence 0 meet
        let previous = self.cursor.last_sequence;
        if event.sequence <= previous {
            return Err(LogError::OutOfOrder {
                line: self.line,
                previous,
                found: event.sequence,
            });
        }

        self.cursor.last_sequence = event.sequence;
        Ok(Some(event))
    }
}

impl Iterator for FileEventIter<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Appends encoded lines on the writer thread
///
/// Lines go straight to the file with no user-space buffer, so nothing from a
/// failed append can reach the disk later.
struct FileSink {
    file: File,
    path: PathBuf,
    last_sequence: Sequence,
    sync_on_write: bool,
    line: String,
    /// An append failed; the file may end in a torn line
    failed: bool,
}

impl FileSink {
    fn new(file: File, path: PathBuf, last_sequence: Sequence, sync_on_write: bool) -> Self {
        Self {
            file,
            path,
            last_sequence,
            sync_on_write,
            line: String::new(),
            failed: false,
        }
    }

    fn write_line(&mut self) -> std::io::Result<()> {
        self.file.write_all(self.line.as_bytes())?;
        if self.sync_on_write {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

impl EventSink for FileSink {
    fn append(&mut self, mutation: &Mutation) -> Result<Sequence> {
        if self.failed {
            return Err(LogError::Failed);
        }
        let sequence = self.last_sequence + 1;

        self.line.clear();
        codec::encode_into(&mut self.line, sequence, mutation);
        if let Err(e) = self.write_line() {
            self.failed = true;
            return Err(e.into());
        }

        self.last_sequence = sequence;
        Ok(sequence)
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn last_sequence(&self) -> Sequence {
        self.last_sequence
    }

    fn close(self: Box<Self>) -> Result<()> {
        if self.failed {
            tracing::warn!(path = %self.path.display(), last_sequence = self.last_sequence, "Closed log file after a failed append");
            return Ok(());
        }
        self.file.sync_all()?;
        tracing::debug!(path = %self.path.display(), last_sequence = self.last_sequence, "Closed log file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (FileTransactionLog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = FileLogConfig::new(temp_dir.path().join("transaction.log"));
        let log = FileTransactionLog::open(config).unwrap();
        (log, temp_dir)
    }

    fn read_all(log: &mut FileTransactionLog) -> Vec<Result<Event>> {
        log.read_events().unwrap().collect()
    }

    #[test]
    fn test_open_creates_file_and_parents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/transaction.log");
        let mut log = FileTransactionLog::open(FileLogConfig::new(&path)).unwrap();

        assert!(path.exists());
        assert!(read_all(&mut log).is_empty());
    }

    #[test]
    fn test_sequences_start_at_one() {
        let (log, _temp) = setup();
        let path = log.path().to_path_buf();

        let writer = log.run().unwrap();
        writer.write_put("a", "1").unwrap();
        writer.write_put("b", "2").unwrap();
        writer.write_delete("a").unwrap();
        assert_eq!(writer.flush().unwrap(), 3);
        writer.close().unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, "1\t2\ta\t1\n2\t2\tb\t2\n3\t1\ta\t\n");
    }

    #[test]
    fn test_out_of_order_stops_before_offending_line() {
        let (mut log, _temp) = setup();
        std::fs::write(log.path(), "1\t2\ta\t1\n2\t2\tb\t2\n2\t2\tc\t3\n4\t2\td\t4\n").unwrap();

        let events = read_all(&mut log);

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].as_ref().unwrap(), &Event::put(1, "a", "1"));
        assert_eq!(events[1].as_ref().unwrap(), &Event::put(2, "b", "2"));
        assert!(matches!(
            events[2],
            Err(LogError::OutOfOrder {
                line: 3,
                previous: 2,
                found: 2
            })
        ));
    }

    #[test]
    fn test_zero_sequence_record_is_rejected() {
        let (mut log, _temp) = setup();
        std::fs::write(log.path(), "0\t2\ta\t1\n").unwrap();

        let events = read_all(&mut log);
        assert!(matches!(
            events.as_slice(),
            [Err(LogError::OutOfOrder { line: 1, previous: 0, found: 0 })]
        ));
    }

    #[test]
    fn test_run_refuses_corrupt_log() {
        let (log, _temp) = setup();
        std::fs::write(log.path(), "1\t2\ta\t1\nnot a record\n").unwrap();

        assert!(matches!(log.run(), Err(LogError::Corrupt { line: 2, .. })));
    }

    #[test]
    fn test_torn_tail_detected_and_truncated() {
        let (mut log, _temp) = setup();
        std::fs::write(log.path(), "1\t2\ta\t1\n2\t2\tb\t2\n3\t2\tc").unwrap();

        let events = read_all(&mut log);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], Err(LogError::TornRecord { line: 3 })));

        assert_eq!(log.truncate_torn_tail().unwrap(), 5);
        assert_eq!(log.truncate_torn_tail().unwrap(), 0);

        let events: Vec<Event> = log
            .read_events()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events.len(), 2);

        // Numbering resumes right after the last complete record
        let writer = log.run().unwrap();
        assert_eq!(writer.write_put("c", "3").unwrap().wait().unwrap(), 3);
        writer.close().unwrap();
    }

    #[test]
    fn test_truncate_without_any_terminator_empties_file() {
        let (mut log, _temp) = setup();
        std::fs::write(log.path(), "1\t2\tpartial").unwrap();

        assert_eq!(log.truncate_torn_tail().unwrap(), 11);
        assert_eq!(std::fs::metadata(log.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_close_without_run() {
        let (log, _temp) = setup();
        log.close().unwrap();
    }

    #[test]
    fn test_failed_append_stops_the_writer() {
        let (log, _temp) = setup();
        let path = log.path().to_path_buf();
        std::fs::write(&path, "1\t2\ta\t1\n").unwrap();
        log.close().unwrap();

        // A read-only handle makes every write fail
        let file = File::open(&path).unwrap();
        let sink = FileSink::new(file, path.clone(), 1, false);
        let writer = LogWriter::spawn(BACKEND, Box::new(sink), 4).unwrap();

        let receipt = writer.write_put("b", "2").unwrap();
        assert!(matches!(receipt.wait(), Err(LogError::Failed)));

        let errors = writer.errors();
        assert!(matches!(
            errors.next_timeout(std::time::Duration::from_secs(5)),
            Some(LogError::Io(_))
        ));
        assert!(writer.is_failed());
        assert!(matches!(writer.write_put("c", "3"), Err(LogError::Failed)));
        writer.close().unwrap();

        assert!(errors.try_next().is_none());
        assert_eq!(writer.last_sequence(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\t2\ta\t1\n");
    }
}
