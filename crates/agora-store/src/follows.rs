//! Follow edges. The followee is a `(username, server)` pair, never a
//! resolved account, so a local user can follow someone who only exists on a
//! peer.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::Follow;
use crate::row::{fmt_ts, now, ts_at, uuid_at};

impl Database {
    /// Get-or-create a follow edge. Returns `true` if it was created.
    pub fn follow(&self, follower_id: Uuid, followee: &str, server_id: Uuid) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO follows (id, follower_id, followee, server_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                follower_id.to_string(),
                followee,
                server_id.to_string(),
                fmt_ts(&now()),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Returns `true` if an edge was removed.
    pub fn unfollow(&self, follower_id: Uuid, followee: &str, server_id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND followee = ?2 AND server_id = ?3",
            params![follower_id.to_string(), followee, server_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn is_following(&self, follower_id: Uuid, followee: &str, server_id: Uuid) -> Result<bool> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM follows
             WHERE follower_id = ?1 AND followee = ?2 AND server_id = ?3",
            params![follower_id.to_string(), followee, server_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// Edges going out of a local user.
    pub fn list_follows(&self, follower_id: Uuid) -> Result<Vec<Follow>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, follower_id, followee, server_id, created_at
             FROM follows WHERE follower_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![follower_id.to_string()], |row| {
            Ok(Follow {
                id: uuid_at(row, 0)?,
                follower_id: uuid_at(row, 1)?,
                followee: row.get(2)?,
                server_id: uuid_at(row, 3)?,
                created_at: ts_at(row, 4)?,
            })
        })?;

        let mut follows = Vec::new();
        for row in rows {
            follows.push(row?);
        }
        Ok(follows)
    }

    /// Number of local users following `(username, server)`.
    pub fn count_followers(&self, username: &str, server_id: Uuid) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM follows WHERE followee = ?1 AND server_id = ?2",
            params![username, server_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }

    /// Number of edges going out of a local user.
    pub fn count_following(&self, follower_id: Uuid) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
            params![follower_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::tests::test_db;

    #[test]
    fn follow_get_or_create_and_counts() {
        let (db, _dir) = test_db();
        let local = db.ensure_local_server(8000).unwrap();
        let peer = db.upsert_server("10.0.0.2", 8000).unwrap();
        let ann = db.create_user("ann").unwrap();
        let bob = db.create_user("bob").unwrap();

        assert!(db.follow(ann.id, "carol", peer.id).unwrap());
        assert!(!db.follow(ann.id, "carol", peer.id).unwrap());
        assert!(db.follow(bob.id, "carol", peer.id).unwrap());
        assert!(db.follow(ann.id, "bob", local.id).unwrap());

        assert_eq!(db.count_followers("carol", peer.id).unwrap(), 2);
        assert_eq!(db.count_followers("carol", local.id).unwrap(), 0);
        assert_eq!(db.count_following(ann.id).unwrap(), 2);
        assert!(db.is_following(ann.id, "bob", local.id).unwrap());
        assert!(!db.is_following(bob.id, "ann", local.id).unwrap());
    }

    #[test]
    fn unfollow_reports_missing_edge() {
        let (db, _dir) = test_db();
        let local = db.ensure_local_server(8000).unwrap();
        let ann = db.create_user("ann").unwrap();
        db.follow(ann.id, "bob", local.id).unwrap();
        assert!(db.unfollow(ann.id, "bob", local.id).unwrap());
        assert!(!db.unfollow(ann.id, "bob", local.id).unwrap());
        assert!(db.list_follows(ann.id).unwrap().is_empty());
    }
}
