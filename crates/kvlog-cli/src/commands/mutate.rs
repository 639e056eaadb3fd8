//! Put and delete command implementations
//!
//! Both recover the log into a scratch store first, so a corrupt log is
//! never appended to, then go through the journaled store so the event is
//! durable before the command reports success.

use crate::backend::OpenLog;
use anyhow::{Context, Result};
use kvlog_core::{recover, JournaledStore, LogConfig, MemoryStore};
use std::sync::Arc;

fn open_journal(config: LogConfig) -> Result<JournaledStore<MemoryStore>> {
    let log = OpenLog::open(config).context("Failed to open transaction log")?;
    let store = MemoryStore::new();
    let (writer, stats) = recover(log, &store).context("Replay failed, refusing to write")?;
    tracing::debug!(events = stats.events, "Recovered state before writing");
    Ok(JournaledStore::new(store, Arc::new(writer)))
}

fn finish(journal: JournaledStore<MemoryStore>) -> Result<()> {
    let (_, log) = journal.into_inner();
    let last_sequence = log.flush().context("Failed to flush transaction log")?;
    tracing::debug!(backend = log.backend(), last_sequence, "Flushed transaction log");
    log.close().context("Failed to close transaction log")?;
    Ok(())
}

pub fn put(config: LogConfig, key: &str, value: &str) -> Result<()> {
    let journal = open_journal(config)?;
    let sequence = journal.put(key, value).context("Failed to log put")?;
    finish(journal)?;

    println!("✓ #{} PUT {}", sequence, key);
    Ok(())
}

pub fn delete(config: LogConfig, key: &str) -> Result<()> {
    let journal = open_journal(config)?;
    let sequence = journal.delete(key).context("Failed to log delete")?;
    finish(journal)?;

    println!("✓ #{} DELETE {}", sequence, key);
    Ok(())
}
