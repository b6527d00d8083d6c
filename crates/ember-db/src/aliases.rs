use anyhow::Result;
use ember_types::UserId;

use crate::{Database, OptionalExt};

impl Database {
    pub fn alias_for_day(&self, user_id: UserId, day: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT alias FROM aliases WHERE user_id = ?1 AND valid_day = ?2",
                rusqlite::params![user_id, day],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Store `candidate` as the user's alias for `day` unless one already
    /// exists, and return whichever alias is stored.
    pub fn issue_alias(&self, user_id: UserId, day: &str, candidate: &str) -> Result<String> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO aliases (user_id, valid_day, alias) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, day, candidate],
            )?;
            let alias = tx.query_row(
                "SELECT alias FROM aliases WHERE user_id = ?1 AND valid_day = ?2",
                rusqlite::params![user_id, day],
                |row| row.get(0),
            )?;
            Ok(alias)
        })
    }
}
