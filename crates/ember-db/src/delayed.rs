use anyhow::Result;
use ember_types::{DelayedItem, MessageId, NewDelayedItem, UserId};
use rusqlite::Row;

use crate::{Database, OptionalExt, placeholders};

const ITEM_COLUMNS: &str = "id, user_id, mailbox_id, text, ttl_seconds, alias, run_at, cancel_message_id";

impl Database {
    pub fn enqueue_delayed(&self, item: &NewDelayedItem) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO delayed_queue (user_id, mailbox_id, text, ttl_seconds, alias, run_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    item.user_id,
                    item.mailbox_id,
                    item.text,
                    item.ttl_seconds,
                    item.alias,
                    item.run_at
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Remember the message carrying the cancel button for this item.
    pub fn set_cancel_message(&self, id: i64, message_id: MessageId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE delayed_queue SET cancel_message_id = ?2 WHERE id = ?1",
                rusqlite::params![id, message_id],
            )?;
            Ok(())
        })
    }

    pub fn get_delayed(&self, id: i64) -> Result<Option<DelayedItem>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ITEM_COLUMNS} FROM delayed_queue WHERE id = ?1");
            conn.query_row(&sql, [id], item_from_row).optional()
        })
    }

    /// Items with `run_at <= now`, oldest first.
    pub fn due_delayed(&self, now: i64) -> Result<Vec<DelayedItem>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ITEM_COLUMNS} FROM delayed_queue WHERE run_at <= ?1 ORDER BY run_at, id");
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map([now], item_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(items)
        })
    }

    /// Cancel an item owned by `user_id`. Returns false if it was already
    /// published, cancelled, or belongs to someone else.
    pub fn cancel_delayed(&self, id: i64, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM delayed_queue WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Delete processed items in a single statement.
    pub fn delete_delayed_batch(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.with_tx(|tx| {
            let sql = format!("DELETE FROM delayed_queue WHERE id IN ({})", placeholders(ids.len()));
            let n = tx.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
            Ok(n)
        })
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<DelayedItem> {
    Ok(DelayedItem {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mailbox_id: row.get(2)?,
        text: row.get(3)?,
        ttl_seconds: row.get(4)?,
        alias: row.get(5)?,
        run_at: row.get(6)?,
        cancel_message_id: row.get(7)?,
    })
}
