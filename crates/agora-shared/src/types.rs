use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::MAX_USERNAME_LEN;
use crate::error::AgoraError;
use crate::visibility::Authored;
use crate::wire::{WireComment, WirePost};

/// Where a feed item came from, taken from this server's registry record
/// rather than anything the peer reported about itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Origin {
    pub server_id: Uuid,
    pub address: String,
    pub port: u16,
    pub is_local: bool,
}

/// A post ready to be shown to a viewer, local or fetched from a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    pub id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub likes: u64,
    pub comments: Vec<WireComment>,
    pub liked: bool,
    /// Whether the viewer follows the author on the author's server.
    pub following: bool,
    pub origin: Origin,
}

impl FeedItem {
    /// Stamp a wire post with its origin. `following` is filled in later,
    /// once the viewer is known.
    pub fn from_wire(post: WirePost, origin: Origin) -> Self {
        Self {
            id: post.id,
            content: post.content,
            timestamp: post.timestamp,
            username: post.username,
            likes: post.likes,
            comments: post.comments,
            liked: post.liked,
            following: false,
            origin,
        }
    }
}

impl Authored for FeedItem {
    fn author(&self) -> &str {
        &self.username
    }

    fn server_ref(&self) -> Uuid {
        self.origin.server_id
    }

    fn content(&self) -> &str {
        &self.content
    }
}

/// Check a username for a local account.
///
/// Letters, digits and `@ . + - _` only, at most [`MAX_USERNAME_LEN`] chars.
pub fn validate_username(username: &str) -> Result<(), AgoraError> {
    if username.is_empty() {
        return Err(AgoraError::InvalidUsername("empty".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AgoraError::InvalidUsername(format!(
            "longer than {MAX_USERNAME_LEN} characters"
        )));
    }
    if let Some(c) = username
        .chars()
        .find(|c| !(c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')))
    {
        return Err(AgoraError::InvalidUsername(format!(
            "character {c:?} not allowed"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("ann.b+c@d-e_f").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("a b").is_err());
        assert!(validate_username("../etc").is_err());
        assert!(validate_username(&"x".repeat(151)).is_err());
    }

    #[test]
    fn test_from_wire_keeps_registry_origin() {
        let origin = Origin {
            server_id: Uuid::new_v4(),
            address: "10.0.0.2".into(),
            port: 8001,
            is_local: false,
        };
        let post = WirePost {
            id: Uuid::new_v4(),
            content: "hi".into(),
            timestamp: Utc::now(),
            username: "ann".into(),
            likes: 2,
            comments: vec![],
            liked: true,
        };
        let item = FeedItem::from_wire(post.clone(), origin.clone());
        assert_eq!(item.origin, origin);
        assert_eq!(item.id, post.id);
        assert!(item.liked);
        assert!(!item.following);
    }
}
