use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Actor, Like};
use crate::row::{fmt_ts, now, opt_uuid_at, ts_at, uuid_at};

impl Database {
    /// Record a like. Returns `false` (and changes nothing) if the
    /// `(post, server, username)` triple already liked the post.
    pub fn add_like(&self, post_id: Uuid, server_id: Uuid, actor: Actor<'_>) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO likes (id, post_id, server_id, username, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                post_id.to_string(),
                server_id.to_string(),
                actor.username(),
                actor.user_id().map(|id| id.to_string()),
                fmt_ts(&now()),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Remove a like. Returns `true` if a row was deleted.
    pub fn remove_like(&self, post_id: Uuid, server_id: Uuid, username: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM likes WHERE post_id = ?1 AND server_id = ?2 AND username = ?3",
            params![post_id.to_string(), server_id.to_string(), username],
        )?;
        Ok(affected > 0)
    }

    pub fn count_likes(&self, post_id: Uuid) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
            params![post_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }

    pub fn list_likes(&self, post_id: Uuid) -> Result<Vec<Like>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, post_id, server_id, username, user_id, created_at
             FROM likes WHERE post_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![post_id.to_string()], |row| {
            Ok(Like {
                id: uuid_at(row, 0)?,
                post_id: uuid_at(row, 1)?,
                server_id: uuid_at(row, 2)?,
                username: row.get(3)?,
                user_id: opt_uuid_at(row, 4)?,
                created_at: ts_at(row, 5)?,
            })
        })?;

        let mut likes = Vec::new();
        for row in rows {
            likes.push(row?);
        }
        Ok(likes)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::tests::test_db;
    use crate::models::Actor;

    #[test]
    fn like_is_idempotent_per_triple() {
        let (db, _dir) = test_db();
        let local = db.ensure_local_server(8000).unwrap();
        let peer = db.upsert_server("10.0.0.2", 8000).unwrap();
        let ann = db.create_user("ann").unwrap();
        let post = db.create_post(ann.id, "hello").unwrap();

        assert!(db.add_like(post.id, peer.id, Actor::Remote { username: "ann" }).unwrap());
        assert!(!db.add_like(post.id, peer.id, Actor::Remote { username: "ann" }).unwrap());
        // Same username, different server: a different actor.
        assert!(db.add_like(post.id, local.id, Actor::Local(&ann)).unwrap());
        assert_eq!(db.count_likes(post.id).unwrap(), 2);

        let likes = db.list_likes(post.id).unwrap();
        let local_like = likes.iter().find(|l| l.server_id == local.id).unwrap();
        assert_eq!(local_like.user_id, Some(ann.id));
        let remote_like = likes.iter().find(|l| l.server_id == peer.id).unwrap();
        assert_eq!(remote_like.user_id, None);
    }

    #[test]
    fn unlike_restores_count() {
        let (db, _dir) = test_db();
        let peer = db.upsert_server("10.0.0.2", 8000).unwrap();
        let ann = db.create_user("ann").unwrap();
        let post = db.create_post(ann.id, "hello").unwrap();

        let before = db.count_likes(post.id).unwrap();
        db.add_like(post.id, peer.id, Actor::Remote { username: "bob" }).unwrap();
        assert!(db.remove_like(post.id, peer.id, "bob").unwrap());
        assert_eq!(db.count_likes(post.id).unwrap(), before);
        assert!(!db.remove_like(post.id, peer.id, "bob").unwrap());
    }
}
