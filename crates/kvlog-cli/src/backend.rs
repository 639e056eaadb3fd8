//! Runtime backend selection

use kvlog_core::{
    EventIterator, FileLogConfig, LogConfig, LogWriter, Result, SqliteLogConfig, TransactionLog,
};
use kvlog_file::FileTransactionLog;
use kvlog_sqlite::SqliteTransactionLog;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    File,
    Sqlite,
}

impl Backend {
    pub fn default_path(self) -> PathBuf {
        match self {
            Backend::File => PathBuf::from("transaction.log"),
            Backend::Sqlite => PathBuf::from("transactions.db"),
        }
    }

    pub fn config(self, path: PathBuf) -> LogConfig {
        match self {
            Backend::File => LogConfig::File(FileLogConfig::new(path)),
            Backend::Sqlite => LogConfig::Sqlite(SqliteLogConfig::new(path)),
        }
    }
}

/// Either backend, behind one [`TransactionLog`]
pub enum OpenLog {
    File(FileTransactionLog),
    Sqlite(SqliteTransactionLog),
}

impl OpenLog {
    pub fn open(config: LogConfig) -> Result<Self> {
        match config {
            LogConfig::File(cfg) => Ok(OpenLog::File(FileTransactionLog::open(cfg)?)),
            LogConfig::Sqlite(cfg) => Ok(OpenLog::Sqlite(SqliteTransactionLog::open(cfg)?)),
        }
    }
}

impl TransactionLog for OpenLog {
    fn backend(&self) -> &'static str {
        match self {
            OpenLog::File(log) => log.backend(),
            OpenLog::Sqlite(log) => log.backend(),
        }
    }

    fn read_events(&mut self) -> Result<Box<dyn EventIterator + '_>> {
        match self {
            OpenLog::File(log) => log.read_events(),
            OpenLog::Sqlite(log) => log.read_events(),
        }
    }

    fn run(self) -> Result<LogWriter> {
        match self {
            OpenLog::File(log) => log.run(),
            OpenLog::Sqlite(log) => log.run(),
        }
    }

    fn close(self) -> Result<()> {
        match self {
            OpenLog::File(log) => log.close(),
            OpenLog::Sqlite(log) => log.close(),
        }
    }
}
