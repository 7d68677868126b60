//! Per-viewer visibility rules.
//!
//! The same filter runs over local posts and over posts fetched from peers:
//! a peer only enforces its own server-level policy, never the viewer's
//! personal blocklists.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Anything with an author on some server.
pub trait Authored {
    fn author(&self) -> &str;
    fn server_ref(&self) -> Uuid;
    fn content(&self) -> &str;
}

/// Which slice of the network a feed shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedMode {
    All,
    FollowingOnly,
    /// Case-sensitive substring match on content or author.
    Search(String),
}

/// Blocklists and follow edges of an authenticated viewer, loaded once per
/// request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: Uuid,
    pub username: String,
    /// `(username, server id)` pairs.
    pub blocked_users: HashSet<(String, Uuid)>,
    pub blocked_servers: HashSet<Uuid>,
    /// `(username, server id)` pairs.
    pub follows: HashSet<(String, Uuid)>,
}

impl Viewer {
    pub fn new(user_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn has_blocked_user(&self, username: &str, server: Uuid) -> bool {
        self.blocked_users.contains(&(username.to_string(), server))
    }

    pub fn has_blocked_server(&self, server: Uuid) -> bool {
        self.blocked_servers.contains(&server)
    }

    pub fn follows(&self, username: &str, server: Uuid) -> bool {
        self.follows.contains(&(username.to_string(), server))
    }
}

/// Decide whether `item` is shown to `viewer` (`None` = anonymous) in `mode`.
pub fn visible<I: Authored + ?Sized>(item: &I, viewer: Option<&Viewer>, mode: &FeedMode) -> bool {
    let server = item.server_ref();

    if let Some(v) = viewer {
        if v.has_blocked_user(item.author(), server) || v.has_blocked_server(server) {
            return false;
        }
    }

    match mode {
        FeedMode::All => true,
        FeedMode::FollowingOnly => viewer.is_some_and(|v| v.follows(item.author(), server)),
        FeedMode::Search(q) => item.content().contains(q.as_str()) || item.author().contains(q.as_str()),
    }
}
