//! JSON shapes exchanged between federated servers.
//!
//! Every inbound handler produces these types and the peer fetcher consumes
//! them, so both sides of the protocol stay in lockstep. Optional fields carry
//! `#[serde(default)]` so that older or sloppier peers still parse.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A post as served by `/federation/posts` and `/federation/user/<name>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WirePost {
    pub id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub username: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: Vec<WireComment>,
    /// Whether the requesting user (on the requesting server) liked it.
    #[serde(default)]
    pub liked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireComment {
    pub id: Uuid,
    pub content: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

/// Body of a `/federation/posts` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(deserialize_with = "de_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostsResponse {
    pub posts: Vec<WirePost>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfileResponse {
    pub username: String,
    pub posts: Vec<WirePost>,
    pub followers: u64,
    pub following_users: u64,
}

/// Body of `/federation/like/<id>` and `/federation/unlike/<id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorRequest {
    pub username: String,
    #[serde(deserialize_with = "de_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeResponse {
    #[serde(rename = "likeCount", default)]
    pub like_count: u64,
    pub success: bool,
}

impl LikeResponse {
    pub fn failed() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentRequest {
    pub username: String,
    pub content: String,
    #[serde(deserialize_with = "de_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentResponse {
    #[serde(rename = "Comment")]
    pub comment: WireComment,
}

/// Identifies a registry entry by network location (`add_servers`,
/// `block_server`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerAddress {
    pub ip: String,
    #[serde(deserialize_with = "de_port")]
    pub port: u16,
}

/// Accept a port as either a JSON number or a numeric string.
///
/// Some peers forward the port straight out of their request metadata, which
/// is a string.
pub fn de_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u64),
        Text(String),
    }

    let value = match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(n) => n,
        PortRepr::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("invalid port string: {s:?}")))?,
    };
    u16::try_from(value).map_err(|_| D::Error::custom(format!("port out of range: {value}")))
}
