//! CRUD operations for [`Post`] records and the enriched listing used by
//! feeds and federation responses.

use agora_shared::wire::WirePost;
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{EnrichedPost, Post};
use crate::row::{fmt_ts, now, ts_at, uuid_at};

/// Selects which local posts [`Database::list_enriched_posts`] returns and
/// whose likes set the `liked` flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostQuery<'a> {
    /// Only posts by this local user.
    pub author: Option<Uuid>,
    /// `(username, server id)` of the actor whose likes mark posts as liked.
    pub liked_by: Option<(&'a str, Uuid)>,
}

impl Database {
    // ------------------------------------------------------------------
    // Create / update
    // ------------------------------------------------------------------

    pub fn create_post(&self, user_id: Uuid, content: &str) -> Result<Post> {
        let post = Post {
            id: Uuid::new_v4(),
            user_id,
            content: content.to_string(),
            created_at: now(),
        };
        self.conn().execute(
            "INSERT INTO posts (id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                post.id.to_string(),
                post.user_id.to_string(),
                post.content,
                fmt_ts(&post.created_at),
            ],
        )?;
        Ok(post)
    }

    /// Replace a post's content. Authorship is checked by the caller.
    pub fn update_post_content(&self, id: Uuid, content: &str) -> Result<Post> {
        let affected = self.conn().execute(
            "UPDATE posts SET content = ?1 WHERE id = ?2",
            params![content, id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_post(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_post(&self, id: Uuid) -> Result<Post> {
        self.conn()
            .query_row(
                "SELECT id, user_id, content, created_at FROM posts WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(Post {
                        id: uuid_at(row, 0)?,
                        user_id: uuid_at(row, 1)?,
                        content: row.get(2)?,
                        created_at: ts_at(row, 3)?,
                    })
                },
            )
            .map_err(StoreError::from_query)
    }

    /// Local posts, newest first, each with author username, like count,
    /// `liked` flag and comments.
    pub fn list_enriched_posts(&self, query: PostQuery<'_>) -> Result<Vec<EnrichedPost>> {
        let (liker, liker_server) = match query.liked_by {
            Some((name, server)) => (Some(name), Some(server.to_string())),
            None => (None, None),
        };

        let mut stmt = self.conn().prepare(
            "SELECT p.id, p.user_id, p.content, p.created_at, u.username,
                    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
                    EXISTS (SELECT 1 FROM likes l
                            WHERE l.post_id = p.id AND l.username = ?1 AND l.server_id = ?2)
             FROM posts p
             JOIN users u ON u.id = p.user_id
             WHERE ?3 IS NULL OR p.user_id = ?3
             ORDER BY p.created_at DESC, p.rowid DESC",
        )?;

        let rows = stmt.query_map(
            params![liker, liker_server, query.author.map(|a| a.to_string())],
            |row| {
                let post = Post {
                    id: uuid_at(row, 0)?,
                    user_id: uuid_at(row, 1)?,
                    content: row.get(2)?,
                    created_at: ts_at(row, 3)?,
                };
                let like_count: i64 = row.get(5)?;
                Ok(EnrichedPost {
                    post,
                    username: row.get(4)?,
                    like_count: like_count.max(0) as u64,
                    liked: row.get(6)?,
                    comments: Vec::new(),
                })
            },
        )?;

        let mut posts = Vec::new();
        for row in rows {
            let mut enriched = row?;
            enriched.comments = self.list_comments(enriched.post.id)?;
            posts.push(enriched);
        }
        Ok(posts)
    }
}

impl EnrichedPost {
    pub fn to_wire(&self) -> WirePost {
        WirePost {
            id: self.post.id,
            content: self.post.content.clone(),
            timestamp: self.post.created_at,
            username: self.username.clone(),
            likes: self.like_count,
            comments: self.comments.iter().map(|c| c.to_wire()).collect(),
            liked: self.liked,
        }
    }
}
