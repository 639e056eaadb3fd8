//! Events command implementation

use crate::backend::OpenLog;
use anyhow::{Context, Result};
use kvlog_core::{LogConfig, TransactionLog};

pub fn execute(config: LogConfig) -> Result<()> {
    let mut log = OpenLog::open(config).context("Failed to open transaction log")?;

    let mut count = 0u64;
    for event in log.read_events().context("Failed to read events")? {
        let event = event.context("Failed to read events")?;
        println!("{}", event);
        count += 1;
    }

    log.close().context("Failed to close transaction log")?;
    tracing::debug!(count, "Printed events");
    Ok(())
}
