use anyhow::Result;
use ember_types::{MessageId, NewRelay, Relay, RelayId, UserId};
use rusqlite::Row;

use crate::{Database, OptionalExt};

impl Database {
    pub fn create_relay(&self, new: &NewRelay) -> Result<RelayId> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO relays (a_user_id, b_user_id, a_alias, b_alias, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![new.a_user_id, new.b_user_id, new.a_alias, new.b_alias, new.expires_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_relay(&self, id: RelayId) -> Result<Option<Relay>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, a_user_id, b_user_id, a_alias, b_alias, expires_at FROM relays WHERE id = ?1",
                [id],
                relay_from_row,
            )
            .optional()
        })
    }

    /// Most recent relay the user takes part in with `expires_at > now`.
    pub fn active_relay_for(&self, user_id: UserId, now: i64) -> Result<Option<Relay>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, a_user_id, b_user_id, a_alias, b_alias, expires_at FROM relays
                 WHERE (a_user_id = ?1 OR b_user_id = ?1) AND expires_at > ?2
                 ORDER BY id DESC LIMIT 1",
                rusqlite::params![user_id, now],
                relay_from_row,
            )
            .optional()
        })
    }

    /// Active relay whose history holds `message_id` as delivered to `user_id`.
    pub fn relay_by_message(&self, user_id: UserId, message_id: MessageId, now: i64) -> Result<Option<Relay>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT r.id, r.a_user_id, r.b_user_id, r.a_alias, r.b_alias, r.expires_at
                 FROM relay_messages m
                 JOIN relays r ON r.id = m.relay_id
                 WHERE m.user_id = ?1 AND m.message_id = ?2 AND r.expires_at > ?3
                 ORDER BY m.id DESC LIMIT 1",
                rusqlite::params![user_id, message_id, now],
                relay_from_row,
            )
            .optional()
        })
    }

    /// Remember that `message_id` was delivered to `user_id` inside the relay.
    pub fn record_relay_message(&self, relay_id: RelayId, user_id: UserId, message_id: MessageId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO relay_messages (relay_id, user_id, message_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![relay_id, user_id, message_id],
            )?;
            Ok(())
        })
    }

    pub fn last_relay_message(&self, relay_id: RelayId, user_id: UserId) -> Result<Option<MessageId>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT message_id FROM relay_messages WHERE relay_id = ?1 AND user_id = ?2 ORDER BY id DESC LIMIT 1",
                rusqlite::params![relay_id, user_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Expire every active relay of the user by setting `expires_at = now`.
    pub fn close_relays_for(&self, user_id: UserId, now: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE relays SET expires_at = ?2 WHERE (a_user_id = ?1 OR b_user_id = ?1) AND expires_at > ?2",
                rusqlite::params![user_id, now],
            )?;
            Ok(n)
        })
    }

    /// Delete relays with `expires_at <= now` together with their message history.
    pub fn purge_expired_relays(&self, now: i64) -> Result<usize> {
        self.with_tx(|tx| {
            tx.execute(
                "DELETE FROM relay_messages WHERE relay_id IN (SELECT id FROM relays WHERE expires_at <= ?1)",
                [now],
            )?;
            let n = tx.execute("DELETE FROM relays WHERE expires_at <= ?1", [now])?;
            Ok(n)
        })
    }
}

fn relay_from_row(row: &Row<'_>) -> rusqlite::Result<Relay> {
    Ok(Relay {
        id: row.get(0)?,
        a_user_id: row.get(1)?,
        b_user_id: row.get(2)?,
        a_alias: row.get(3)?,
        b_alias: row.get(4)?,
        expires_at: row.get(5)?,
    })
}
