//! Extension ledger: per (post, user, kind) toggle rows. Rows are soft-toggled
//! and only hard-deleted together with their post.

use anyhow::Result;
use ember_types::{ExtensionCounts, ExtensionKind, PostKey, ToggleOutcome, UserId};
use rusqlite::Connection;

use crate::{Database, OptionalExt};

impl Database {
    /// Flip the contribution of `user_id` for `kind` on a post.
    /// Returns true if the row is now active.
    pub fn toggle_extension(&self, key: PostKey, user_id: UserId, kind: ExtensionKind) -> Result<bool> {
        let outcome = self.toggle_extension_guarded(key, user_id, kind, || true)?;
        Ok(outcome == ToggleOutcome::Activated)
    }

    /// Toggle with a pre-check on deactivation. `may_deactivate` is only consulted
    /// when the row is currently active; if it returns false nothing is written.
    /// Read, check and write happen in one transaction.
    pub fn toggle_extension_guarded<F>(
        &self,
        key: PostKey,
        user_id: UserId,
        kind: ExtensionKind,
        may_deactivate: F,
    ) -> Result<ToggleOutcome>
    where
        F: FnOnce() -> bool,
    {
        let post_key = key.to_string();
        self.with_tx(|tx| {
            let active: Option<bool> = tx
                .query_row(
                    "SELECT active FROM extensions WHERE post_key = ?1 AND user_id = ?2 AND kind = ?3",
                    rusqlite::params![post_key, user_id, kind.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            match active {
                None => {
                    tx.execute(
                        "INSERT INTO extensions (post_key, user_id, kind, active) VALUES (?1, ?2, ?3, 1)",
                        rusqlite::params![post_key, user_id, kind.as_str()],
                    )?;
                    Ok(ToggleOutcome::Activated)
                }
                Some(false) => {
                    set_active(tx, &post_key, user_id, kind, true)?;
                    Ok(ToggleOutcome::Activated)
                }
                Some(true) => {
                    if !may_deactivate() {
                        return Ok(ToggleOutcome::Refused);
                    }
                    set_active(tx, &post_key, user_id, kind, false)?;
                    Ok(ToggleOutcome::Deactivated)
                }
            }
        })
    }

    pub fn extension_counts(&self, key: PostKey) -> Result<ExtensionCounts> {
        self.with_conn(|conn| query_counts(conn, &key.to_string()))
    }

    pub fn total_bonus_seconds(&self, key: PostKey) -> Result<i64> {
        self.with_conn(|conn| Ok(query_counts(conn, &key.to_string())?.total_seconds()))
    }

    pub fn delete_extensions(&self, key: PostKey) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM extensions WHERE post_key = ?1", [key.to_string()])?;
            Ok(n)
        })
    }

    /// Remove all rows for the given posts. All-or-nothing.
    pub fn delete_extensions_batch(&self, keys: &[PostKey]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.with_tx(|tx| {
            let mut stmt = tx.prepare("DELETE FROM extensions WHERE post_key = ?1")?;
            let mut total = 0;
            for key in keys {
                total += stmt.execute([key.to_string()])?;
            }
            Ok(total)
        })
    }
}

fn set_active(conn: &Connection, post_key: &str, user_id: UserId, kind: ExtensionKind, active: bool) -> Result<()> {
    conn.execute(
        "UPDATE extensions SET active = ?4 WHERE post_key = ?1 AND user_id = ?2 AND kind = ?3",
        rusqlite::params![post_key, user_id, kind.as_str(), active],
    )?;
    Ok(())
}

/// Active rows per kind. Unknown kinds (rows written by older builds) are skipped.
pub(crate) fn query_counts(conn: &Connection, post_key: &str) -> Result<ExtensionCounts> {
    let mut stmt = conn.prepare(
        "SELECT kind, COUNT(*) FROM extensions WHERE post_key = ?1 AND active = 1 GROUP BY kind",
    )?;
    let rows = stmt
        .query_map([post_key], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut counts = ExtensionCounts::default();
    for (kind, n) in rows {
        if let Ok(kind) = kind.parse::<ExtensionKind>() {
            counts.set(kind, n);
        }
    }
    Ok(counts)
}
