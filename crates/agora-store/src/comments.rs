use agora_shared::wire::WireComment;
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Actor, Comment};
use crate::row::{fmt_ts, now, opt_uuid_at, ts_at, uuid_at};

impl Database {
    pub fn add_comment(
        &self,
        post_id: Uuid,
        server_id: Uuid,
        actor: Actor<'_>,
        content: &str,
    ) -> Result<Comment> {
        let comment = Comment {
            id: Uuid::new_v4(),
            post_id,
            server_id,
            username: actor.username().to_string(),
            user_id: actor.user_id(),
            content: content.to_string(),
            created_at: now(),
        };
        self.conn().execute(
            "INSERT INTO comments (id, post_id, server_id, username, user_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                comment.id.to_string(),
                comment.post_id.to_string(),
                comment.server_id.to_string(),
                comment.username,
                comment.user_id.map(|id| id.to_string()),
                comment.content,
                fmt_ts(&comment.created_at),
            ],
        )?;
        Ok(comment)
    }

    /// Comments on a post, oldest first.
    pub fn list_comments(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, post_id, server_id, username, user_id, content, created_at
             FROM comments WHERE post_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![post_id.to_string()], |row| {
            Ok(Comment {
                id: uuid_at(row, 0)?,
                post_id: uuid_at(row, 1)?,
                server_id: uuid_at(row, 2)?,
                username: row.get(3)?,
                user_id: opt_uuid_at(row, 4)?,
                content: row.get(5)?,
                created_at: ts_at(row, 6)?,
            })
        })?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }
}

impl Comment {
    pub fn to_wire(&self) -> WireComment {
        WireComment {
            id: self.id,
            content: self.content.clone(),
            username: self.username.clone(),
            timestamp: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::database::tests::test_db;
    use crate::models::Actor;

    #[test]
    fn comments_listed_in_order() {
        let (db, _dir) = test_db();
        let local = db.ensure_local_server(8000).unwrap();
        let peer = db.upsert_server("10.0.0.2", 8000).unwrap();
        let ann = db.create_user("ann").unwrap();
        let post = db.create_post(ann.id, "hello").unwrap();

        db.add_comment(post.id, local.id, Actor::Local(&ann), "first").unwrap();
        db.add_comment(post.id, peer.id, Actor::Remote { username: "bob" }, "second")
            .unwrap();

        let comments = db.list_comments(post.id).unwrap();
        let bodies: Vec<_> = comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
        assert_eq!(comments[0].user_id, Some(ann.id));
        assert_eq!(comments[1].user_id, None);
        assert_eq!(comments[1].to_wire().username, "bob");
    }
}
