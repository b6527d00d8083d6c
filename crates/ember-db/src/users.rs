use anyhow::Result;
use ember_types::{MailboxId, Role, UserId};

use crate::{Database, OptionalExt};

impl Database {
    /// Insert the user if unknown. Returns true if a row was created.
    pub fn ensure_user(&self, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("INSERT OR IGNORE INTO users (user_id) VALUES (?1)", [user_id])?;
            Ok(n > 0)
        })
    }

    pub fn user_role(&self, user_id: UserId) -> Result<Option<Role>> {
        let raw: Option<String> = self.with_conn(|conn| {
            conn.query_row("SELECT role FROM users WHERE user_id = ?1", [user_id], |row| row.get(0))
                .optional()
        })?;
        // Unknown role strings degrade to the least privileged role
        Ok(raw.map(|r| r.parse().unwrap_or(Role::User)))
    }

    pub fn set_user_role(&self, user_id: UserId, role: Role) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, role) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET role = excluded.role",
                rusqlite::params![user_id, role.as_str()],
            )?;
            Ok(())
        })
    }

    pub fn remove_user(&self, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE user_id = ?1", [user_id])? > 0))
    }

    pub fn set_active_mailbox(&self, user_id: UserId, mailbox_id: MailboxId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, active_mailbox_id) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET active_mailbox_id = excluded.active_mailbox_id",
                rusqlite::params![user_id, mailbox_id],
            )?;
            Ok(())
        })
    }

    pub fn active_mailbox(&self, user_id: UserId) -> Result<Option<MailboxId>> {
        let id: Option<Option<MailboxId>> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT active_mailbox_id FROM users WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(id.flatten())
    }

    /// TTL the user picked for their next post, if any.
    pub fn post_ttl(&self, user_id: UserId) -> Result<Option<i64>> {
        let ttl: Option<Option<i64>> = self.with_conn(|conn| {
            conn.query_row("SELECT post_ttl FROM users WHERE user_id = ?1", [user_id], |row| row.get(0))
                .optional()
        })?;
        Ok(ttl.flatten())
    }

    /// Store the TTL for the user's next post. `None` clears the choice.
    pub fn set_post_ttl(&self, user_id: UserId, ttl_seconds: Option<i64>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, post_ttl) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET post_ttl = excluded.post_ttl",
                rusqlite::params![user_id, ttl_seconds],
            )?;
            Ok(())
        })
    }
}
