//! Outbound federation calls.
//!
//! Every public method here swallows its failure: a peer that is down, slow,
//! returns garbage or answers with something huge contributes nothing, and the
//! problem is logged. [`FetchError`] never leaves this module.

use std::time::Duration;

use agora_shared::constants::APP_NAME;
use agora_shared::types::FeedItem;
use agora_shared::wire::{
    ActorRequest, CommentRequest, CommentResponse, LikeResponse, PostsRequest, PostsResponse,
    UserProfileResponse, WireComment,
};
use agora_store::Server;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ServerConfig;

/// Why a peer call produced nothing.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("response body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("malformed body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A peer's view of one of its users, with posts stamped by origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerProfile {
    pub posts: Vec<FeedItem>,
    pub followers: u64,
    pub following: u64,
}

#[derive(Clone)]
pub struct PeerFetcher {
    client: Client,
    timeout: Duration,
    max_body: usize,
    /// Sent with every request so the peer can find us in its registry.
    public_port: u16,
}

impl PeerFetcher {
    pub fn new(config: &ServerConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.peer_timeout)
            .connect_timeout(config.peer_timeout)
            .build()?;

        Ok(Self {
            client,
            timeout: config.peer_timeout,
            max_body: config.max_peer_response_bytes,
            public_port: config.public_port,
        })
    }

    /// All posts a peer is willing to show `requester`, stamped with the
    /// registry's record of the peer.
    pub async fn fetch_peer_posts(&self, server: &Server, requester: Option<&str>) -> Vec<FeedItem> {
        let url = format!("{}/federation/posts", server.base_url());
        let body = PostsRequest {
            username: requester.map(str::to_string),
            port: self.public_port,
        };

        match self
            .call::<PostsResponse>(self.client.post(url).json(&body))
            .await
        {
            Ok(resp) => {
                debug!(peer = %server.base_url(), count = resp.posts.len(), "fetched peer posts");
                stamp(resp.posts, server)
            }
            Err(e) => {
                warn!(peer = %server.base_url(), error = %e, "peer posts unavailable");
                Vec::new()
            }
        }
    }

    pub async fn fetch_peer_user(&self, server: &Server, username: &str) -> Option<PeerProfile> {
        let url = format!("{}/federation/user/{username}", server.base_url());

        match self.call::<UserProfileResponse>(self.client.get(url)).await {
            Ok(resp) => Some(PeerProfile {
                posts: stamp(resp.posts, server),
                followers: resp.followers,
                following: resp.following_users,
            }),
            Err(e) => {
                warn!(peer = %server.base_url(), username, error = %e, "peer profile unavailable");
                None
            }
        }
    }

    pub async fn forward_like(&self, server: &Server, post_id: Uuid, username: &str) -> LikeResponse {
        self.forward_like_action(server, "like", post_id, username).await
    }

    pub async fn forward_unlike(&self, server: &Server, post_id: Uuid, username: &str) -> LikeResponse {
        self.forward_like_action(server, "unlike", post_id, username).await
    }

    pub async fn forward_comment(
        &self,
        server: &Server,
        post_id: Uuid,
        username: &str,
        content: &str,
    ) -> Option<WireComment> {
        let url = format!("{}/federation/comment/{post_id}", server.base_url());
        let body = CommentRequest {
            username: username.to_string(),
            content: content.to_string(),
            port: self.public_port,
        };

        match self
            .call::<CommentResponse>(self.client.post(url).json(&body))
            .await
        {
            Ok(resp) => Some(resp.comment),
            Err(e) => {
                warn!(peer = %server.base_url(), %post_id, error = %e, "comment not delivered");
                None
            }
        }
    }

    async fn forward_like_action(
        &self,
        server: &Server,
        action: &str,
        post_id: Uuid,
        username: &str,
    ) -> LikeResponse {
        let url = format!("{}/federation/{action}/{post_id}", server.base_url());
        let body = ActorRequest {
            username: username.to_string(),
            port: self.public_port,
        };

        match self.call::<LikeResponse>(self.client.post(url).json(&body)).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(peer = %server.base_url(), action, %post_id, error = %e, "like action not delivered");
                LikeResponse::failed()
            }
        }
    }

    /// Send one request and decode a 200 JSON body, all under one deadline.
    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, FetchError> {
        let exchange = async {
            let mut resp = req.send().await?;
            if resp.status() != StatusCode::OK {
                return Err(FetchError::Status(resp.status()));
            }
            if resp
                .content_length()
                .is_some_and(|len| len > self.max_body as u64)
            {
                return Err(FetchError::TooLarge(self.max_body));
            }

            let mut body = Vec::new();
            while let Some(chunk) = resp.chunk().await? {
                if body.len() + chunk.len() > self.max_body {
                    return Err(FetchError::TooLarge(self.max_body));
                }
                body.extend_from_slice(&chunk);
            }
            Ok::<T, FetchError>(serde_json::from_slice(&body)?)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }
}

fn stamp(posts: Vec<agora_shared::wire::WirePost>, server: &Server) -> Vec<FeedItem> {
    let origin = server.origin();
    posts
        .into_iter()
        .map(|post| FeedItem::from_wire(post, origin.clone()))
        .collect()
}
