//! Local persistence for announced reports.
//!
//! A single `SQLite` file holds every report the relay has announced,
//! plus a small key-value table for credentials:
//!
//! ```text
//! reports(item_id PRIMARY KEY, announcement_id, resolved)
//! settings(key PRIMARY KEY, value)
//! ```
//!
//! Every mutating call is one autocommitted statement, so it is durable
//! and atomic by the time it returns.

mod reports;
mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("report already recorded: {0}")]
    DuplicateKey(String),

    #[error("report not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, StoreError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS reports (
        item_id         TEXT PRIMARY KEY NOT NULL,
        announcement_id TEXT NOT NULL,
        resolved        INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS settings (
        key   TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    );
";

/// Durable record of which queue items have been announced.
pub struct ReportStore {
    conn: Connection,
}

impl ReportStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// The parent directory is created if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Returns the default database path: `<data dir>/modqueue-relay/relay.sqlite`.
    ///
    /// `MODQUEUE_RELAY_DATA_DIR` overrides the data directory.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(dir) = std::env::var_os("MODQUEUE_RELAY_DATA_DIR")
            && !dir.is_empty()
        {
            return Some(PathBuf::from(dir).join("relay.sqlite"));
        }
        dirs::data_dir().map(|d| d.join("modqueue-relay").join("relay.sqlite"))
    }
}
