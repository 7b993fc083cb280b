//! Report storage: record announcements and track their resolution.

use rusqlite::{ErrorCode, OptionalExtension};

use super::{ReportStore, Result, StoreError};

/// One announced queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub item_id: String,
    pub announcement_id: String,
    pub resolved: bool,
}

impl ReportStore {
    /// Whether a report exists for `item_id`, resolved or not.
    ///
    /// Resolved reports still count: an id is never announced twice.
    pub fn is_announced(&self, item_id: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM reports WHERE item_id = ?1",
                [item_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Records that `item_id` was announced as chat message `announcement_id`.
    pub fn add(&self, item_id: &str, announcement_id: &str) -> Result<()> {
        let inserted = self.conn.execute(
            "INSERT INTO reports (item_id, announcement_id, resolved) VALUES (?1, ?2, 0)",
            [item_id, announcement_id],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateKey(item_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Lists every report whose item was still pending when last seen.
    pub fn unresolved_records(&self) -> Result<Vec<ReportRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT item_id, announcement_id FROM reports WHERE resolved = 0")?;
        let rows = stmt.query_map([], |row| {
            Ok(ReportRecord {
                item_id: row.get(0)?,
                announcement_id: row.get(1)?,
                resolved: false,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Marks the report for `item_id` as resolved.
    ///
    /// Idempotent: resolving an already-resolved report is a no-op.
    pub fn mark_resolved(&self, item_id: &str) -> Result<()> {
        // SQLite counts matched rows, so a second call still reports one.
        let rows = self.conn.execute(
            "UPDATE reports SET resolved = 1 WHERE item_id = ?1",
            [item_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(item_id.to_string()));
        }
        Ok(())
    }
}
