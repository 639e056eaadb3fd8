use kvlog_core::error::{LogError, Result};
use rusqlite::Connection;

/// Whether `table` exists in the main schema
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )
    .map_err(|e| LogError::Open(format!("failed to verify table {} exists: {}", table, e)))
}

/// Create the events table
///
/// `AUTOINCREMENT` keeps sequence values strictly increasing for the life of
/// the table, even if the newest rows are ever removed.
pub fn create_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE {table} (
            sequence   INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type INTEGER NOT NULL,
            key        TEXT NOT NULL,
            value      TEXT NOT NULL
        );"
    ))
    .map_err(|e| LogError::Open(format!("failed to create table {}: {}", table, e)))
}

/// Create the events table if absent; returns whether it was created
///
/// Migration beyond "create if absent" is not attempted.
pub fn ensure_table(conn: &Connection, table: &str) -> Result<bool> {
    if table_exists(conn, table)? {
        return Ok(false);
    }
    create_table(conn, table)?;
    tracing::info!(table, "Created transaction log table");
    Ok(true)
}
