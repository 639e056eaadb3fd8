use crate::schema;
use kvlog_core::{
    error::{LogError, Result},
    event_log::{EventIterator, EventSink, TransactionLog},
    types::{Event, EventKind, Mutation, Sequence},
    LogWriter, SqliteLogConfig,
};
use rusqlite::{params, Connection, OpenFlags};
use std::collections::VecDeque;

const BACKEND: &str = "sqlite";

fn db_err(e: rusqlite::Error) -> LogError {
    LogError::Database(e.to_string())
}

/// SQLite-backed transaction log in its constructed state
///
/// The storage engine assigns sequences through the table's autoincrement
/// key; this type never pre-assigns one and only checks ordering on values
/// read back.
pub struct SqliteTransactionLog {
    config: SqliteLogConfig,
    conn: Connection,
}

impl SqliteTransactionLog {
    /// Open the database and create the events table if absent
    pub fn open(config: SqliteLogConfig) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| LogError::Open(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| LogError::Open(format!("{}: {}", config.path.display(), e)))?;

        Self::configure_connection(&conn, &config)?;
        schema::ensure_table(&conn, &config.table)?;

        tracing::info!(
            path = %config.path.display(),
            table = %config.table,
            "Opened SQLite transaction log"
        );

        Ok(Self { config, conn })
    }

    /// Get the underlying connection (for inspection and custom queries)
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn configure_connection(conn: &Connection, cfg: &SqliteLogConfig) -> Result<()> {
        if cfg.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| LogError::Config(e.to_string()))?;
        }

        conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())
            .map_err(|e| LogError::Config(e.to_string()))?;

        Ok(())
    }

    /// Highest sequence currently stored (0 for an empty table)
    fn max_sequence(&self) -> Result<Sequence> {
        let max: i64 = self
            .conn
            .query_row(
                &format!("SELECT COALESCE(MAX(sequence), 0) FROM {}", self.config.table),
                [],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(max.max(0) as Sequence)
    }
}

impl TransactionLog for SqliteTransactionLog {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn read_events(&mut self) -> Result<Box<dyn EventIterator + '_>> {
        Ok(Box::new(SqliteEventIter {
            conn: &self.conn,
            select_sql: format!(
                "SELECT sequence, event_type, key, value FROM {}
                 WHERE sequence > ?1 ORDER BY sequence LIMIT ?2",
                self.config.table
            ),
            batch_size: self.config.replay_batch_size,
            buffer: VecDeque::new(),
            previous: 0,
            row: 0,
            exhausted: false,
            pending: None,
            done: false,
        }))
    }

    fn run(self) -> Result<LogWriter> {
        let last_sequence = self.max_sequence()?;
        let sink = SqliteSink {
            insert_sql: format!(
                "INSERT INTO {} (event_type, key, value) VALUES (?1, ?2, ?3)",
                self.config.table
            ),
            conn: self.conn,
            last_sequence,
        };
        LogWriter::spawn(BACKEND, Box::new(sink), self.config.queue_capacity)
    }

    fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| db_err(e))
    }
}

/// Streams rows in ascending sequence order, one page at a time
struct SqliteEventIter<'a> {
    conn: &'a Connection,
    select_sql: String,
    batch_size: usize,
    buffer: VecDeque<Event>,
    /// Last sequence handed out; the next page starts after it
    previous: Sequence,
    /// Rows read so far, for error reporting
    row: u64,
    /// The last page came back short
    exhausted: bool,
    /// Error hit while decoding a page, reported once the buffer drains
    pending: Option<LogError>,
    done: bool,
}

fn decode_row((sequence, code, key, value): (i64, i64, String, String), line: u64) -> Result<Event> {
    let sequence = Sequence::try_from(sequence).map_err(|_| LogError::Corrupt {
        line,
        reason: format!("negative sequence {}", sequence),
    })?;
    let kind = u8::try_from(code)
        .ok()
        .and_then(EventKind::from_code)
        .ok_or_else(|| LogError::Corrupt {
            line,
            reason: format!("unknown event type {}", code),
        })?;

    Ok(Event {
        sequence,
        kind,
        key,
        value: if kind == EventKind::Put { value } else { String::new() },
    })
}

impl SqliteEventIter<'_> {
    fn fetch_page(&mut self) -> Result<()> {
        let after = self.buffer.back().map_or(self.previous, |e| e.sequence);
        let conn = self.conn;

        let mut stmt = conn.prepare_cached(&self.select_sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![after as i64, self.batch_size as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err)?;

        let mut fetched = 0;
        for row in rows {
            fetched += 1;
            let line = self.row + self.buffer.len() as u64 + 1;
            match row.map_err(db_err).and_then(|row| decode_row(row, line)) {
                Ok(event) => self.buffer.push_back(event),
                Err(e) => {
                    // Rows ahead of the bad one are still handed out first
                    self.pending = Some(e);
                    self.exhausted = true;
                    return Ok(());
                }
            }
        }

        if fetched < self.batch_size {
            self.exhausted = true;
        }
        Ok(())
    }

    fn read_next_event(&mut self) -> Result<Option<Event>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page()?;
        }

        let Some(event) = self.buffer.pop_front() else {
            return match self.pending.take() {
                Some(e) => Err(e),
                None => Ok(None),
            };
        };
        self.row += 1;

        if event.sequence <= self.previous {
            return Err(LogError::OutOfOrder {
                line: self.row,
                previous: self.previous,
                found: event.sequence,
            });
        }
        self.previous = event.sequence;
        Ok(Some(event))
    }
}

impl Iterator for SqliteEventIter<'_> {
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

/// Inserts rows on the writer thread
struct SqliteSink {
    conn: Connection,
    insert_sql: String,
    last_sequence: Sequence,
}

impl EventSink for SqliteSink {
    fn append(&mut self, mutation: &Mutation) -> Result<Sequence> {
        let mut stmt = self.conn.prepare_cached(&self.insert_sql).map_err(db_err)?;
        stmt.execute(params![
            mutation.kind.code() as i64,
            mutation.key,
            mutation.value
        ])
        .map_err(db_err)?;

        let sequence = self.conn.last_insert_rowid() as Sequence;
        if sequence <= self.last_sequence {
            return Err(LogError::InvalidState(format!(
                "storage engine assigned sequence {} after {}",
                sequence, self.last_sequence
            )));
        }

        self.last_sequence = sequence;
        Ok(sequence)
    }

    fn sync(&mut self) -> Result<()> {
        // Each insert commits on its own in autocommit mode
        Ok(())
    }

    fn last_sequence(&self) -> Sequence {
        self.last_sequence
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().map_err(|(_, e)| db_err(e))
    }
}
