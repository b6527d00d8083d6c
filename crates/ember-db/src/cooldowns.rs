use anyhow::{Result, bail};
use ember_types::{Cooldown, MailboxId, UserId};
use rusqlite::Row;

use crate::{Database, OptionalExt};

impl Database {
    /// Ban every user who ever carried `alias` from posting until `until`,
    /// in one mailbox or (with `None`) everywhere. A newer ban for the same
    /// scope replaces the older one. Returns the number of users banned.
    pub fn set_cooldown_by_alias(&self, alias: &str, mailbox_id: Option<MailboxId>, until: i64) -> Result<usize> {
        if alias.trim().is_empty() {
            bail!("alias cannot be empty");
        }
        self.with_tx(|tx| {
            let mut stmt = tx.prepare("SELECT DISTINCT user_id FROM aliases WHERE alias = ?1")?;
            let users = stmt
                .query_map([alias.trim()], |row| row.get::<_, UserId>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            for user_id in &users {
                tx.execute(
                    "DELETE FROM user_cooldowns WHERE user_id = ?1 AND mailbox_id IS ?2",
                    rusqlite::params![user_id, mailbox_id],
                )?;
                tx.execute(
                    "INSERT INTO user_cooldowns (user_id, mailbox_id, alias, until) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![user_id, mailbox_id, alias.trim(), until],
                )?;
            }
            Ok(users.len())
        })
    }

    /// The ban that currently blocks `user_id` from posting to `mailbox_id`,
    /// either scoped to that mailbox or global. The longest one wins.
    pub fn active_cooldown(&self, user_id: UserId, mailbox_id: MailboxId, now: i64) -> Result<Option<Cooldown>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, mailbox_id, alias, until FROM user_cooldowns
                 WHERE user_id = ?1 AND (mailbox_id = ?2 OR mailbox_id IS NULL) AND until > ?3
                 ORDER BY until DESC LIMIT 1",
                rusqlite::params![user_id, mailbox_id, now],
                cooldown_from_row,
            )
            .optional()
        })
    }

    /// Lift the bans issued against `alias` in the given scope.
    pub fn remove_cooldowns_by_alias(&self, alias: &str, mailbox_id: Option<MailboxId>) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM user_cooldowns WHERE alias = ?1 AND mailbox_id IS ?2",
                rusqlite::params![alias.trim(), mailbox_id],
            )?;
            Ok(n)
        })
    }

    pub fn purge_expired_cooldowns(&self, now: i64) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM user_cooldowns WHERE until <= ?1", [now])?))
    }
}

fn cooldown_from_row(row: &Row<'_>) -> rusqlite::Result<Cooldown> {
    Ok(Cooldown {
        user_id: row.get(0)?,
        mailbox_id: row.get(1)?,
        alias: row.get(2)?,
        until: row.get(3)?,
    })
}
