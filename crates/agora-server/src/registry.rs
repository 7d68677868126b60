//! Peer lookups layered over the store: which peers a viewer may reach, and
//! who is calling a federation endpoint.

use std::net::IpAddr;

use agora_shared::constants::LOCAL_SERVER_ADDRESS;
use agora_shared::visibility::Viewer;
use agora_store::{Database, Server, StoreError};
use tracing::info;
use uuid::Uuid;

use crate::error::ServerError;

/// Remote peers the viewer's feed should query, in registry order.
pub fn peers_for_viewer(db: &Database, viewer: Option<&Viewer>) -> Result<Vec<Server>, StoreError> {
    Ok(db
        .list_servers()?
        .into_iter()
        .filter(|s| !s.is_local && !is_blocked_for_viewer(s, viewer))
        .collect())
}

/// A server is unreachable for a viewer if an admin blocked it globally or the
/// viewer blocked it personally.
pub fn is_blocked_for_viewer(server: &Server, viewer: Option<&Viewer>) -> bool {
    server.blocked || viewer.is_some_and(|v| v.has_blocked_server(server.id))
}

/// Resolve a server reference from a URL. `local` names this instance.
pub fn resolve_server_ref(db: &Database, raw: &str) -> Result<Server, ServerError> {
    if raw == LOCAL_SERVER_ADDRESS {
        return Ok(db.get_local_server()?);
    }
    let id = Uuid::parse_str(raw)
        .map_err(|_| ServerError::BadRequest(format!("invalid server id {raw:?}")))?;
    db.get_server(id).map_err(|e| match e {
        StoreError::NotFound => ServerError::NotFound(format!("server {id}")),
        other => other.into(),
    })
}

/// Identify the peer behind an inbound federation call.
///
/// Peers are keyed by their source IP plus the port they claim to serve on.
/// Unknown callers are registered when `auto_register` is set and are
/// `NotFound` otherwise. A globally blocked caller is refused.
pub fn resolve_caller(
    db: &Database,
    ip: IpAddr,
    claimed_port: u16,
    auto_register: bool,
) -> Result<Server, ServerError> {
    let address = ip.to_canonical().to_string();

    let server = match db.find_server(&address, claimed_port)? {
        Some(server) => server,
        None if auto_register => {
            let server = db.upsert_server(&address, claimed_port)?;
            info!(peer = %server.base_url(), id = %server.id, "registered new peer on first contact");
            server
        }
        None => {
            return Err(ServerError::NotFound(format!(
                "unknown peer {address}:{claimed_port}"
            )))
        }
    };

    if server.blocked {
        return Err(ServerError::Forbidden("server is blocked".into()));
    }
    Ok(server)
}

/// Refuse a caller that did not say which port it serves on, if any peer at
/// its address is globally blocked.
pub fn refuse_blocked_address(db: &Database, ip: IpAddr) -> Result<(), ServerError> {
    let address = ip.to_canonical().to_string();
    let blocked = db
        .list_servers()?
        .iter()
        .any(|s| s.address == address && s.blocked);
    if blocked {
        return Err(ServerError::Forbidden("server is blocked".into()));
    }
    Ok(())
}
