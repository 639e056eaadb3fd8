//! Replay and get command implementations

use crate::backend::OpenLog;
use anyhow::{Context, Result};
use kvlog_core::{replay, KeyValueStore, LogConfig, MemoryStore, ReplayStats, TransactionLog};

fn rebuild(config: LogConfig) -> Result<(MemoryStore, ReplayStats)> {
    let mut log = OpenLog::open(config).context("Failed to open transaction log")?;
    let store = MemoryStore::new();
    let stats = replay(&mut log, &store).context("Replay failed")?;
    log.close().context("Failed to close transaction log")?;
    Ok((store, stats))
}

pub fn execute(config: LogConfig) -> Result<()> {
    let (store, stats) = rebuild(config)?;

    for (key, value) in store.snapshot() {
        println!("{}\t{:?}", key, value);
    }

    println!(
        "\n✓ Replayed {} events ({} puts, {} deletes) up to sequence {} in {:?}",
        stats.events, stats.puts, stats.deletes, stats.last_sequence, stats.duration
    );
    println!("{} key(s) live", store.len());
    Ok(())
}

pub fn get(config: LogConfig, key: &str) -> Result<()> {
    let (store, _) = rebuild(config)?;
    let value = store.get(key)?;
    println!("{}", value);
    Ok(())
}
