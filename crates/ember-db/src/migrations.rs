use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const LATEST_VERSION: i64 = 3;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version = current_version(conn)?;

    if version < 1 {
        info!("DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                user_id             INTEGER PRIMARY KEY,
                role                TEXT NOT NULL DEFAULT 'user',
                active_mailbox_id   INTEGER,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE mailboxes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                channel_id  INTEGER NOT NULL UNIQUE,
                creator_id  INTEGER NOT NULL,
                stat_day    INTEGER,
                stat_time   TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE posts (
                chat_id         INTEGER NOT NULL,
                message_id      INTEGER NOT NULL,
                author_id       INTEGER NOT NULL,
                alias           TEXT NOT NULL,
                base_text       TEXT NOT NULL,
                base_delete_at  INTEGER NOT NULL,
                delete_at       INTEGER NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (chat_id, message_id)
            );

            CREATE INDEX idx_posts_delete_at ON posts(delete_at);

            CREATE TABLE extensions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                post_key    TEXT NOT NULL,
                user_id     INTEGER NOT NULL,
                kind        TEXT NOT NULL,
                active      INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(post_key, user_id, kind)
            );

            CREATE INDEX idx_extensions_post ON extensions(post_key, active);

            CREATE TABLE relays (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                a_user_id   INTEGER NOT NULL,
                b_user_id   INTEGER NOT NULL,
                a_alias     TEXT NOT NULL,
                b_alias     TEXT NOT NULL,
                expires_at  INTEGER NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_relays_a ON relays(a_user_id, expires_at);
            CREATE INDEX idx_relays_b ON relays(b_user_id, expires_at);

            CREATE TABLE relay_messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                relay_id    INTEGER NOT NULL REFERENCES relays(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL,
                message_id  INTEGER NOT NULL
            );

            CREATE INDEX idx_relay_messages_user_message ON relay_messages(user_id, message_id);
            CREATE INDEX idx_relay_messages_relay ON relay_messages(relay_id, user_id);

            CREATE TABLE delayed_queue (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id             INTEGER NOT NULL,
                mailbox_id          INTEGER NOT NULL,
                text                TEXT NOT NULL,
                ttl_seconds         INTEGER NOT NULL,
                alias               TEXT NOT NULL,
                run_at              INTEGER NOT NULL,
                cancel_message_id   INTEGER,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_delayed_queue_run_at ON delayed_queue(run_at);

            CREATE TABLE stats (
                day     TEXT NOT NULL,
                key     TEXT NOT NULL,
                cnt     INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (day, key)
            );

            CREATE TABLE aliases (
                user_id     INTEGER NOT NULL,
                valid_day   TEXT NOT NULL,
                alias       TEXT NOT NULL,
                PRIMARY KEY (user_id, valid_day)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("DB: running migration v2 (weekly stats marker)");
        conn.execute_batch(
            "
            ALTER TABLE mailboxes ADD COLUMN stats_last_sent TEXT;
            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    if version < 3 {
        info!("DB: running migration v3 (cooldowns, post ttl, mailbox buttons)");
        conn.execute_batch(
            "
            ALTER TABLE mailboxes ADD COLUMN extension_buttons TEXT;
            ALTER TABLE users ADD COLUMN post_ttl INTEGER;

            CREATE TABLE user_cooldowns (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL,
                mailbox_id  INTEGER,
                alias       TEXT NOT NULL,
                until       INTEGER NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_user_cooldowns_user ON user_cooldowns(user_id, until);
            INSERT INTO schema_version (version) VALUES (3);
            ",
        )?;
    }

    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<i64> {
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| {
        r.get(0)
    })?;
    Ok(version)
}
