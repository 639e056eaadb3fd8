//! Verify command implementation

use crate::backend::OpenLog;
use anyhow::{bail, Context, Result};
use kvlog_core::{LogConfig, LogError, TransactionLog};

pub fn execute(config: LogConfig, repair: bool) -> Result<()> {
    let mut log = OpenLog::open(config).context("Failed to open transaction log")?;

    if repair {
        match &mut log {
            OpenLog::File(file_log) => {
                let removed = file_log
                    .truncate_torn_tail()
                    .context("Failed to repair transaction log")?;
                if removed > 0 {
                    println!("Removed {} byte(s) of torn record", removed);
                }
            }
            OpenLog::Sqlite(_) => bail!("--repair only applies to the file backend"),
        }
    }

    println!("\nTransaction Log ({})", log.backend());
    println!("{}", "=".repeat(60));

    let mut count = 0u64;
    let mut last_sequence = 0;
    for event in log.read_events().context("Failed to read events")? {
        match event {
            Ok(event) => {
                count += 1;
                last_sequence = event.sequence;
            }
            Err(e) => {
                println!("Valid events before failure: {}", count);
                println!("Last good sequence: {}", last_sequence);
                let label = if e.is_integrity() { "Integrity violation" } else { "Read error" };
                println!("\n✗ {}: {}", label, e);
                if repair_hint(&e, repair) {
                    println!("Run 'kvlog verify --repair' to drop a torn final record");
                }
                return Err(e).context("Transaction log failed verification");
            }
        }
    }

    log.close().context("Failed to close transaction log")?;

    println!("Events: {}", count);
    println!("Last Sequence: {}", last_sequence);
    println!("\n✓ Transaction log is consistent");
    Ok(())
}

/// Only a torn final record is something `--repair` can fix
fn repair_hint(error: &LogError, repair: bool) -> bool {
    !repair && matches!(error, LogError::TornRecord { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_hint_only_for_torn_records() {
        assert!(repair_hint(&LogError::TornRecord { line: 3 }, false));
        assert!(!repair_hint(&LogError::TornRecord { line: 3 }, true));
        assert!(!repair_hint(
            &LogError::OutOfOrder {
                line: 2,
                previous: 5,
                found: 4
            },
            false
        ));
        assert!(!repair_hint(
            &LogError::Corrupt {
                line: 1,
                reason: "bad kind".into()
            },
            false
        ));
    }
}
