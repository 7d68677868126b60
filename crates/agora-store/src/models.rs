//! Domain model structs persisted in the instance database.

use std::net::{IpAddr, SocketAddr};

use agora_shared::constants::LOCAL_SERVER_ADDRESS;
use agora_shared::types::Origin;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A federation peer, or the sentinel row standing for this instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub id: Uuid,
    /// IP or hostname; [`LOCAL_SERVER_ADDRESS`] for the local row.
    pub address: String,
    pub port: u16,
    pub is_local: bool,
    /// Global block set by an admin, independent of per-user blocklists.
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Server {
    /// Base URL of the peer's HTTP API. IPv6 literals are bracketed.
    pub fn base_url(&self) -> String {
        match self.address.parse::<IpAddr>() {
            Ok(ip) => format!("http://{}", SocketAddr::new(ip, self.port)),
            Err(_) => format!("http://{}:{}", self.address, self.port),
        }
    }

    pub fn origin(&self) -> Origin {
        Origin {
            server_id: self.id,
            address: self.address.clone(),
            port: self.port,
            is_local: self.is_local,
        }
    }

    pub fn is_local_address(address: &str) -> bool {
        address == LOCAL_SERVER_ADDRESS
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A local account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A post joined with everything a feed needs to show it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedPost {
    pub post: Post,
    pub username: String,
    pub like_count: u64,
    /// Whether the requested `(username, server)` liked it.
    pub liked: bool,
    pub comments: Vec<Comment>,
}

// ---------------------------------------------------------------------------
// Likes and comments
// ---------------------------------------------------------------------------

/// Who performed an action on a local post.
///
/// Foreign actors are plain usernames scoped to their server and are never
/// resolved to a local account.
#[derive(Debug, Clone, Copy)]
pub enum Actor<'a> {
    Local(&'a User),
    Remote { username: &'a str },
}

impl<'a> Actor<'a> {
    pub fn username(&self) -> &'a str {
        match self {
            Actor::Local(user) => &user.username,
            Actor::Remote { username } => username,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Local(user) => Some(user.id),
            Actor::Remote { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Like {
    pub id: Uuid,
    pub post_id: Uuid,
    pub server_id: Uuid,
    pub username: String,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub server_id: Uuid,
    pub username: String,
    pub user_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Social graph and blocklists
// ---------------------------------------------------------------------------

/// A local user following `followee` on `server_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Follow {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub followee: String,
    pub server_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserBlock {
    pub id: Uuid,
    pub user_id: Uuid,
    pub blocked_username: String,
    pub server_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_at(address: &str, port: u16) -> Server {
        Server {
            id: Uuid::new_v4(),
            address: address.to_string(),
            port,
            is_local: false,
            blocked: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn base_url_brackets_ipv6() {
        assert_eq!(server_at("::1", 8000).base_url(), "http://[::1]:8000");
        assert_eq!(server_at("fe80::2", 80).base_url(), "http://[fe80::2]:80");
    }

    #[test]
    fn base_url_keeps_ipv4_and_hostnames() {
        assert_eq!(server_at("10.0.0.2", 8000).base_url(), "http://10.0.0.2:8000");
        assert_eq!(server_at("peer.example", 443).base_url(), "http://peer.example:443");
    }
}
