//! Settings storage: small string values that outlive the process.
//!
//! Currently only the Reddit refresh token lives here.

use rusqlite::OptionalExtension;

use super::{ReportStore, Result};

const REFRESH_TOKEN_KEY: &str = "reddit_refresh_token";

impl ReportStore {
    /// Returns the stored Reddit refresh token, if any.
    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.setting(REFRESH_TOKEN_KEY)
    }

    /// Stores the Reddit refresh token, replacing any previous one.
    pub fn set_refresh_token(&self, token: &str) -> Result<()> {
        self.set_setting(REFRESH_TOKEN_KEY, token)
    }

    fn setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }
}
