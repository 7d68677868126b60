//! Per-user blocklists: one hides an author everywhere, the other hides an
//! entire peer. Both are independent of the global server block.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::UserBlock;
use crate::row::{fmt_ts, now, ts_at, uuid_at};

impl Database {
    // ------------------------------------------------------------------
    // User blocks
    // ------------------------------------------------------------------

    /// Get-or-create. Returns `true` if the block was created.
    pub fn block_user(&self, user_id: Uuid, blocked_username: &str, server_id: Uuid) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO user_blocks (id, user_id, blocked_username, server_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                user_id.to_string(),
                blocked_username,
                server_id.to_string(),
                fmt_ts(&now()),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn unblock_user(&self, user_id: Uuid, blocked_username: &str, server_id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM user_blocks
             WHERE user_id = ?1 AND blocked_username = ?2 AND server_id = ?3",
            params![user_id.to_string(), blocked_username, server_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn list_user_blocks(&self, user_id: Uuid) -> Result<Vec<UserBlock>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, blocked_username, server_id, created_at
             FROM user_blocks WHERE user_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            Ok(UserBlock {
                id: uuid_at(row, 0)?,
                user_id: uuid_at(row, 1)?,
                blocked_username: row.get(2)?,
                server_id: uuid_at(row, 3)?,
                created_at: ts_at(row, 4)?,
            })
        })?;

        let mut blocks = Vec::new();
        for row in rows {
            blocks.push(row?);
        }
        Ok(blocks)
    }

    // ------------------------------------------------------------------
    // Server blocks
    // ------------------------------------------------------------------

    pub fn block_server(&self, user_id: Uuid, server_id: Uuid) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO server_blocks (id, user_id, server_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::new_v4().to_string(),
                user_id.to_string(),
                server_id.to_string(),
                fmt_ts(&now()),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn unblock_server(&self, user_id: Uuid, server_id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM server_blocks WHERE user_id = ?1 AND server_id = ?2",
            params![user_id.to_string(), server_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Ids of the servers a user has blocked.
    pub fn list_server_blocks(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare(
            "SELECT server_id FROM server_blocks WHERE user_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| uuid_at(row, 0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}
