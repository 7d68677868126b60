//! Peer registry persistence.

use agora_shared::constants::LOCAL_SERVER_ADDRESS;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Server;
use crate::row::{fmt_ts, now, ts_at, uuid_at};

const SERVER_COLUMNS: &str = "id, address, port, is_local, blocked, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Local sentinel
    // ------------------------------------------------------------------

    /// Create the local row if it is missing and keep its port in sync.
    pub fn ensure_local_server(&self, port: u16) -> Result<Server> {
        match self.get_local_server() {
            Ok(local) if local.port == port => Ok(local),
            Ok(local) => {
                self.conn().execute(
                    "UPDATE servers SET port = ?1 WHERE id = ?2",
                    params![port, local.id.to_string()],
                )?;
                tracing::info!(old = local.port, new = port, "updated local server port");
                Ok(Server { port, ..local })
            }
            Err(StoreError::NotFound) => {
                let local = Server {
                    id: Uuid::new_v4(),
                    address: LOCAL_SERVER_ADDRESS.to_string(),
                    port,
                    is_local: true,
                    blocked: false,
                    created_at: now(),
                };
                self.insert_server(&local)?;
                tracing::info!(id = %local.id, "created local server entry");
                Ok(local)
            }
            Err(e) => Err(e),
        }
    }

    /// The row representing this instance.
    pub fn get_local_server(&self) -> Result<Server> {
        self.conn()
            .query_row(
                &format!("SELECT {SERVER_COLUMNS} FROM servers WHERE is_local = 1"),
                [],
                row_to_server,
            )
            .map_err(StoreError::from_query)
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    /// Get-or-create a peer keyed by `(address, port)`.
    pub fn upsert_server(&self, address: &str, port: u16) -> Result<Server> {
        if let Some(existing) = self.find_server(address, port)? {
            return Ok(existing);
        }
        let server = Server {
            id: Uuid::new_v4(),
            address: address.to_string(),
            port,
            is_local: false,
            blocked: false,
            created_at: now(),
        };
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO servers (id, address, port, is_local, blocked, created_at)
             VALUES (?1, ?2, ?3, 0, 0, ?4)",
            params![
                server.id.to_string(),
                server.address,
                server.port,
                fmt_ts(&server.created_at),
            ],
        )?;
        if inserted == 0 {
            // Lost a race against a concurrent insert of the same address.
            return self.find_server(address, port)?.ok_or(StoreError::NotFound);
        }
        tracing::info!(address, port, id = %server.id, "registered peer server");
        Ok(server)
    }

    pub fn get_server(&self, id: Uuid) -> Result<Server> {
        self.conn()
            .query_row(
                &format!("SELECT {SERVER_COLUMNS} FROM servers WHERE id = ?1"),
                params![id.to_string()],
                row_to_server,
            )
            .map_err(StoreError::from_query)
    }

    pub fn find_server(&self, address: &str, port: u16) -> Result<Option<Server>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {SERVER_COLUMNS} FROM servers WHERE address = ?1 AND port = ?2"),
                params![address, port],
                row_to_server,
            )
            .optional()?)
    }

    /// Every registry row, local included, in registration order.
    pub fn list_servers(&self) -> Result<Vec<Server>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SERVER_COLUMNS} FROM servers ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map([], row_to_server)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Set the global block flag. Returns `true` if a row was updated.
    pub fn set_server_blocked(&self, id: Uuid, blocked: bool) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE servers SET blocked = ?1 WHERE id = ?2 AND is_local = 0",
            params![blocked, id.to_string()],
        )?;
        Ok(affected > 0)
    }

    // ON DELETE CASCADE: likes, comments, follows and blocks go with it
    pub fn delete_server(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM servers WHERE id = ?1 AND is_local = 0",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    fn insert_server(&self, server: &Server) -> Result<()> {
        self.conn().execute(
            "INSERT INTO servers (id, address, port, is_local, blocked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                server.id.to_string(),
                server.address,
                server.port,
                server.is_local,
                server.blocked,
                fmt_ts(&server.created_at),
            ],
        )?;
        Ok(())
    }
}

fn row_to_server(row: &rusqlite::Row<'_>) -> rusqlite::Result<Server> {
    Ok(Server {
        id: uuid_at(row, 0)?,
        address: row.get(1)?,
        port: row.get(2)?,
        is_local: row.get(3)?,
        blocked: row.get(4)?,
        created_at: ts_at(row, 5)?,
    })
}
