//! Who is looking.
//!
//! Session handling is outside this crate: whatever fronts the instance
//! authenticates the user and forwards the local username in
//! [`VIEWER_HEADER`]. A missing header means an anonymous viewer.

use std::collections::HashSet;

use agora_shared::constants::VIEWER_HEADER;
use agora_shared::visibility::Viewer;
use agora_store::{Database, StoreError, User};
use axum::http::HeaderMap;

use crate::error::ServerError;

fn header_username(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(VIEWER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Load a user's blocklists and follow edges.
pub fn load_viewer(db: &Database, user: &User) -> Result<Viewer, ServerError> {
    let mut viewer = Viewer::new(user.id, user.username.clone());

    viewer.blocked_users = db
        .list_user_blocks(user.id)?
        .into_iter()
        .map(|b| (b.blocked_username, b.server_id))
        .collect();
    viewer.blocked_servers = db.list_server_blocks(user.id)?.into_iter().collect::<HashSet<_>>();
    viewer.follows = db
        .list_follows(user.id)?
        .into_iter()
        .map(|f| (f.followee, f.server_id))
        .collect();

    Ok(viewer)
}

/// The viewer named by the request headers, or `None` for anonymous access.
/// A header naming an unknown user is rejected rather than treated as
/// anonymous.
pub fn optional_viewer(db: &Database, headers: &HeaderMap) -> Result<Option<Viewer>, ServerError> {
    let Some(username) = header_username(headers) else {
        return Ok(None);
    };
    let user = match db.get_user_by_username(username) {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(ServerError::LoginRequired),
        Err(e) => return Err(e.into()),
    };
    load_viewer(db, &user).map(Some)
}

pub fn require_viewer(db: &Database, headers: &HeaderMap) -> Result<Viewer, ServerError> {
    optional_viewer(db, headers)?.ok_or(ServerError::LoginRequired)
}
