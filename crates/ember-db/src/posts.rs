use anyhow::Result;
use ember_types::{Post, PostKey};
use rusqlite::{Connection, Row};

use crate::extensions::query_counts;
use crate::{Database, OptionalExt};

const POST_COLUMNS: &str = "chat_id, message_id, author_id, alias, base_text, base_delete_at, delete_at";

impl Database {
    pub fn insert_post(&self, post: &Post) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO posts (chat_id, message_id, author_id, alias, base_text, base_delete_at, delete_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    post.key.chat_id,
                    post.key.message_id,
                    post.author_id,
                    post.alias,
                    post.base_text,
                    post.base_delete_at,
                    post.delete_at.max(post.base_delete_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, key: PostKey) -> Result<Option<Post>> {
        self.with_conn(|conn| query_post(conn, key))
    }

    /// Set the effective expiry. Never drops below `base_delete_at`.
    pub fn set_delete_at(&self, key: PostKey, delete_at: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE posts SET delete_at = MAX(?3, base_delete_at) WHERE chat_id = ?1 AND message_id = ?2",
                rusqlite::params![key.chat_id, key.message_id, delete_at],
            )?;
            Ok(n > 0)
        })
    }

    /// Recompute `delete_at = base_delete_at + active bonus` in one transaction.
    /// Returns the updated post, or `None` if it no longer exists.
    pub fn refresh_delete_at(&self, key: PostKey) -> Result<Option<Post>> {
        self.with_tx(|tx| {
            let Some(mut post) = query_post(tx, key)? else {
                return Ok(None);
            };
            let bonus = query_counts(tx, &key.to_string())?.total_seconds();
            post.delete_at = post.base_delete_at + bonus;
            tx.execute(
                "UPDATE posts SET delete_at = ?3 WHERE chat_id = ?1 AND message_id = ?2",
                rusqlite::params![key.chat_id, key.message_id, post.delete_at],
            )?;
            Ok(Some(post))
        })
    }

    /// Keys of every post with `delete_at <= now`, soonest first.
    pub fn list_expired_posts(&self, now: i64) -> Result<Vec<PostKey>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, message_id FROM posts WHERE delete_at <= ?1 ORDER BY delete_at, chat_id, message_id",
            )?;
            let keys = stmt
                .query_map([now], |row| Ok(PostKey::new(row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(keys)
        })
    }

    pub fn delete_post(&self, key: PostKey) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM posts WHERE chat_id = ?1 AND message_id = ?2",
                rusqlite::params![key.chat_id, key.message_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Delete the given posts. All-or-nothing.
    pub fn delete_posts_batch(&self, keys: &[PostKey]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.with_tx(|tx| {
            let mut stmt = tx.prepare("DELETE FROM posts WHERE chat_id = ?1 AND message_id = ?2")?;
            let mut total = 0;
            for key in keys {
                total += stmt.execute(rusqlite::params![key.chat_id, key.message_id])?;
            }
            Ok(total)
        })
    }

    pub fn count_posts(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?))
    }
}

fn query_post(conn: &Connection, key: PostKey) -> Result<Option<Post>> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE chat_id = ?1 AND message_id = ?2");
    conn.query_row(&sql, rusqlite::params![key.chat_id, key.message_id], post_from_row)
        .optional()
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        key: PostKey::new(row.get(0)?, row.get(1)?),
        author_id: row.get(2)?,
        alias: row.get(3)?,
        base_text: row.get(4)?,
        base_delete_at: row.get(5)?,
        delete_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_types::ExtensionKind;

    fn post(message_id: i64, delete_at: i64) -> Post {
        Post {
            key: PostKey::new(-100, message_id),
            author_id: 1,
            alias: "Quiet Fox".into(),
            base_text: "hello".into(),
            base_delete_at: delete_at,
            delete_at,
        }
    }

    #[test]
    fn insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let p = post(1, 4600);
        db.insert_post(&p).unwrap();
        assert_eq!(db.get_post(p.key).unwrap(), Some(p));
        assert_eq!(db.get_post(PostKey::new(-100, 2)).unwrap(), None);
    }

    #[test]
    fn delete_at_never_below_base() {
        let db = Database::open_in_memory().unwrap();
        let p = post(1, 4600);
        db.insert_post(&p).unwrap();
        db.set_delete_at(p.key, 100).unwrap();
        assert_eq!(db.get_post(p.key).unwrap().unwrap().delete_at, 4600);
        db.set_delete_at(p.key, 8200).unwrap();
        assert_eq!(db.get_post(p.key).unwrap().unwrap().delete_at, 8200);
    }

    #[test]
    fn refresh_applies_active_extensions() {
        let db = Database::open_in_memory().unwrap();
        let p = post(1, 4600);
        db.insert_post(&p).unwrap();
        db.toggle_extension(p.key, 5, ExtensionKind::H1).unwrap();
        assert_eq!(db.refresh_delete_at(p.key).unwrap().unwrap().delete_at, 8200);
        db.toggle_extension(p.key, 5, ExtensionKind::H1).unwrap();
        assert_eq!(db.refresh_delete_at(p.key).unwrap().unwrap().delete_at, 4600);
        assert_eq!(db.refresh_delete_at(PostKey::new(1, 1)).unwrap(), None);
    }

    #[test]
    fn expired_scan_is_inclusive_of_now() {
        let db = Database::open_in_memory().unwrap();
        db.insert_post(&post(1, 50)).unwrap();
        db.insert_post(&post(2, 100)).unwrap();
        db.insert_post(&post(3, 101)).unwrap();
        let expired = db.list_expired_posts(100).unwrap();
        assert_eq!(expired, vec![PostKey::new(-100, 1), PostKey::new(-100, 2)]);

        assert_eq!(db.delete_posts_batch(&expired).unwrap(), 2);
        assert_eq!(db.count_posts().unwrap(), 1);
    }

    #[test]
    fn batch_delete_rolls_back_when_any_row_fails() {
        let db = Database::open_in_memory().unwrap();
        for id in 1..=3 {
            db.insert_post(&post(id, 100)).unwrap();
        }
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER keep_third BEFORE DELETE ON posts WHEN OLD.message_id = 3
                 BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let keys: Vec<PostKey> = (1..=3).map(|id| PostKey::new(-100, id)).collect();
        assert!(db.delete_posts_batch(&keys).is_err());
        assert_eq!(db.count_posts().unwrap(), 3);
        assert!(db.get_post(keys[0]).unwrap().is_some());
    }
}
