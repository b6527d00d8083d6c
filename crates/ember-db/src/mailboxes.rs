use std::collections::HashMap;

use anyhow::{Result, bail};
use ember_types::{ChatId, ExtensionKind, Mailbox, MailboxId, UserId};
use rusqlite::Row;
use tracing::warn;

use crate::{Database, OptionalExt, placeholders};

const MAILBOX_COLUMNS: &str =
    "id, title, channel_id, creator_id, stat_day, stat_time, stats_last_sent, extension_buttons";

impl Database {
    pub fn create_mailbox(&self, title: &str, channel_id: ChatId, creator_id: UserId) -> Result<MailboxId> {
        if title.trim().is_empty() {
            bail!("mailbox title cannot be empty");
        }
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mailboxes (title, channel_id, creator_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![title.trim(), channel_id, creator_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_mailbox(&self, id: MailboxId) -> Result<Option<Mailbox>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MAILBOX_COLUMNS} FROM mailboxes WHERE id = ?1");
            conn.query_row(&sql, [id], mailbox_from_row).optional()
        })
    }

    pub fn mailbox_by_channel(&self, channel_id: ChatId) -> Result<Option<Mailbox>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MAILBOX_COLUMNS} FROM mailboxes WHERE channel_id = ?1");
            conn.query_row(&sql, [channel_id], mailbox_from_row).optional()
        })
    }

    /// Fetch several mailboxes in one query. Missing ids are simply absent.
    pub fn mailboxes_by_ids(&self, ids: &[MailboxId]) -> Result<HashMap<MailboxId, Mailbox>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MAILBOX_COLUMNS} FROM mailboxes WHERE id IN ({})",
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), mailbox_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(|m| (m.id, m)).collect())
        })
    }

    pub fn list_mailboxes(&self) -> Result<Vec<Mailbox>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MAILBOX_COLUMNS} FROM mailboxes ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], mailbox_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Weekly stats schedule: ISO weekday 1..=7 and local "HH:MM".
    pub fn set_stats_schedule(&self, id: MailboxId, day: u32, time_hhmm: &str) -> Result<bool> {
        if !(1..=7).contains(&day) {
            bail!("stat day must be 1..=7, got {}", day);
        }
        if !is_hhmm(time_hhmm) {
            bail!("stat time must be HH:MM, got {:?}", time_hhmm);
        }
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE mailboxes SET stat_day = ?2, stat_time = ?3 WHERE id = ?1",
                rusqlite::params![id, day, time_hhmm],
            )?;
            Ok(n > 0)
        })
    }

    /// Set the extension buttons for a mailbox's posts. `None` restores the
    /// configured default.
    pub fn set_mailbox_buttons(&self, id: MailboxId, kinds: Option<&[ExtensionKind]>) -> Result<bool> {
        if kinds.is_some_and(|k| k.is_empty()) {
            bail!("button list cannot be empty");
        }
        let stored = kinds.map(ExtensionKind::join_list);
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE mailboxes SET extension_buttons = ?2 WHERE id = ?1",
                rusqlite::params![id, stored],
            )?;
            Ok(n > 0)
        })
    }

    /// Claim the weekly broadcast for `marker`. Returns false if it was already
    /// claimed with the same marker, so a repeated tick in the same minute or a
    /// restarted process does not send twice.
    pub fn claim_stats_slot(&self, id: MailboxId, marker: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE mailboxes SET stats_last_sent = ?2
                 WHERE id = ?1 AND (stats_last_sent IS NULL OR stats_last_sent != ?2)",
                rusqlite::params![id, marker],
            )?;
            Ok(n > 0)
        })
    }
}

fn is_hhmm(s: &str) -> bool {
    let Some((h, m)) = s.split_once(':') else {
        return false;
    };
    h.len() == 2
        && m.len() == 2
        && h.parse::<u32>().is_ok_and(|h| h < 24)
        && m.parse::<u32>().is_ok_and(|m| m < 60)
}

fn mailbox_from_row(row: &Row<'_>) -> rusqlite::Result<Mailbox> {
    Ok(Mailbox {
        id: row.get(0)?,
        title: row.get(1)?,
        channel_id: row.get(2)?,
        creator_id: row.get(3)?,
        stat_day: row.get(4)?,
        stat_time: row.get(5)?,
        stats_last_sent: row.get(6)?,
        extension_buttons: row.get::<_, Option<String>>(7)?.and_then(|raw| {
            ExtensionKind::parse_list(&raw)
                .inspect_err(|e| warn!(error = %e, "Ignoring stored button list"))
                .ok()
                .filter(|kinds| !kinds.is_empty())
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_mailbox("Confessions", -1001, 42).unwrap();
        assert_eq!(db.mailbox_by_channel(-1001).unwrap().unwrap().id, id);
        assert!(db.create_mailbox("Dup", -1001, 42).is_err());
        assert!(db.create_mailbox("  ", -1002, 42).is_err());

        let other = db.create_mailbox("Other", -1002, 42).unwrap();
        let found = db.mailboxes_by_ids(&[id, other, 999]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&other].title, "Other");
    }

    #[test]
    fn schedule_validation() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_mailbox("Box", -1001, 42).unwrap();
        assert!(db.set_stats_schedule(id, 8, "10:00").is_err());
        assert!(db.set_stats_schedule(id, 1, "25:00").is_err());
        assert!(db.set_stats_schedule(id, 1, "9:00").is_err());
        assert!(db.set_stats_schedule(id, 1, "09:00").unwrap());

        let mb = db.get_mailbox(id).unwrap().unwrap();
        assert_eq!(mb.stat_day, Some(1));
        assert_eq!(mb.stat_time.as_deref(), Some("09:00"));
    }

    #[test]
    fn stats_slot_claimed_once_per_marker() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_mailbox("Box", -1001, 42).unwrap();
        assert!(db.claim_stats_slot(id, "2026-10-12 09:00").unwrap());
        assert!(!db.claim_stats_slot(id, "2026-10-12 09:00").unwrap());
        assert!(db.claim_stats_slot(id, "2026-10-19 09:00").unwrap());
    }

    #[test]
    fn button_list_per_mailbox() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_mailbox("Box", -1001, 42).unwrap();
        assert_eq!(db.get_mailbox(id).unwrap().unwrap().extension_buttons, None);

        let kinds = [ExtensionKind::M30, ExtensionKind::H6];
        assert!(db.set_mailbox_buttons(id, Some(&kinds)).unwrap());
        assert_eq!(
            db.mailbox_by_channel(-1001).unwrap().unwrap().extension_buttons,
            Some(kinds.to_vec())
        );
        assert!(db.set_mailbox_buttons(id, Some(&[])).is_err());

        assert!(db.set_mailbox_buttons(id, None).unwrap());
        assert_eq!(db.get_mailbox(id).unwrap().unwrap().extension_buttons, None);
        assert!(!db.set_mailbox_buttons(999, None).unwrap());
    }
}
