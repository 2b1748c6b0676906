// Embedded relational store: connection setup, migrations, retry-wrapped
// writes, and typed repository operations per entity.

pub mod fts;
pub mod migrations;
pub mod retry;
pub mod schema;
pub mod vector_shard;

use crate::constants::{DB_BUSY_TIMEOUT_MS, DB_FILENAME};
use crate::error::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub use retry::with_retry;

/// Open (or create) the database at `<data_root>/engine.db`, set the pragmas
/// the store depends on, and bring the schema up to date.
pub fn open_db(data_root: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path(data_root))?;

    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.busy_timeout(std::time::Duration::from_millis(DB_BUSY_TIMEOUT_MS as u64))?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Open an in-memory database for tests, with the same pragmas and schema.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

pub fn db_path(data_root: &Path) -> PathBuf {
    data_root.join(DB_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_store_with_schema() {
        let conn = open_memory().unwrap();
        let version: u32 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert!(version > 0);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let conn = open_memory().unwrap();
        let err = conn.execute(
            "INSERT INTO items (library_id, path, filename, size, mtime, fingerprint, media_type, status)
             VALUES (999, 'x', 'x', 0, '', 'fp', 'video', 'QUEUED')",
            [],
        );
        assert!(err.is_err());
    }
}
