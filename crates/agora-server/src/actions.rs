//! Browser-facing JSON endpoints for local users.
//!
//! Actions on local posts mutate the store directly. Actions on foreign posts
//! are forwarded to the owning peer and report `success: false` when the peer
//! cannot be reached.

use agora_shared::constants::LOCAL_SERVER_ADDRESS;
use agora_shared::types::{validate_username, FeedItem};
use agora_shared::visibility::{FeedMode, Viewer};
use agora_shared::wire::{LikeResponse, ServerAddress, WireComment};
use agora_store::{Actor, Database, Post, Server, StoreError, User};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::ServerError;
use crate::feed::{build_feed, build_profile, Page, Profile};
use crate::registry;
use crate::viewer::{optional_viewer, require_viewer};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "first_page")]
    pub page: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentOutcome {
    pub success: bool,
    pub comment: Option<WireComment>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FollowState {
    pub following: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockState {
    pub blocked: bool,
}

/// A registry row as a viewer sees it.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerView {
    #[serde(flatten)]
    pub server: Server,
    pub blocked_by_viewer: bool,
}

fn non_empty(content: &str) -> Result<&str, ServerError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ServerError::BadRequest("content must not be empty".into()));
    }
    Ok(trimmed)
}

fn viewer_user(db: &Database, viewer: &Viewer) -> Result<User, ServerError> {
    db.get_user(viewer.user_id).map_err(|e| match e {
        StoreError::NotFound => ServerError::LoginRequired,
        other => other.into(),
    })
}

fn local_post(db: &Database, id: Uuid) -> Result<Post, ServerError> {
    db.get_post(id).map_err(|e| match e {
        StoreError::NotFound => ServerError::NotFound(format!("post {id}")),
        other => other.into(),
    })
}

/// Resolve a server reference for an action on a foreign object, refusing
/// servers the viewer cannot reach.
fn reachable_server(db: &Database, viewer: &Viewer, raw: &str) -> Result<Server, ServerError> {
    let server = registry::resolve_server_ref(db, raw)?;
    if registry::is_blocked_for_viewer(&server, Some(viewer)) {
        return Err(ServerError::Forbidden("server is blocked".into()));
    }
    Ok(server)
}

fn find_peer(db: &Database, addr: &ServerAddress) -> Result<Server, ServerError> {
    if Server::is_local_address(&addr.ip) {
        return Err(ServerError::BadRequest("the local server cannot be targeted".into()));
    }
    db.find_server(&addr.ip, addr.port)?
        .ok_or_else(|| ServerError::NotFound(format!("server {}:{}", addr.ip, addr.port)))
}

// ---------------------------------------------------------------------------
// Accounts and posts
// ---------------------------------------------------------------------------

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<User>, ServerError> {
    validate_username(&req.username)?;
    if req.username == LOCAL_SERVER_ADDRESS {
        return Err(ServerError::BadRequest("username is reserved".into()));
    }

    let db = state.db.lock().await;
    if db.username_taken(&req.username)? {
        return Err(ServerError::BadRequest("username already taken".into()));
    }
    let user = db.create_user(&req.username)?;
    info!(username = %user.username, "registered user");
    Ok(Json(user))
}

pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ContentRequest>,
) -> Result<Json<Post>, ServerError> {
    let content = non_empty(&req.content)?;
    let db = state.db.lock().await;
    let viewer = require_viewer(&db, &headers)?;
    Ok(Json(db.create_post(viewer.user_id, content)?))
}

pub async fn edit_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ContentRequest>,
) -> Result<Json<Post>, ServerError> {
    let content = non_empty(&req.content)?;
    let db = state.db.lock().await;
    let viewer = require_viewer(&db, &headers)?;

    if local_post(&db, id)?.user_id != viewer.user_id {
        return Err(ServerError::Forbidden("only the author can edit a post".into()));
    }
    Ok(Json(db.update_post_content(id, content)?))
}

// ---------------------------------------------------------------------------
// Feeds
// ---------------------------------------------------------------------------

pub async fn feed_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(page): Path<u32>,
) -> Result<Json<Page<FeedItem>>, ServerError> {
    let viewer = optional_viewer(&*state.db.lock().await, &headers)?;
    Ok(Json(build_feed(&state, viewer.as_ref(), &FeedMode::All, page).await?))
}

pub async fn feed_following(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(page): Path<u32>,
) -> Result<Json<Page<FeedItem>>, ServerError> {
    let viewer = require_viewer(&*state.db.lock().await, &headers)?;
    Ok(Json(
        build_feed(&state, Some(&viewer), &FeedMode::FollowingOnly, page).await?,
    ))
}

pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<FeedItem>>, ServerError> {
    let viewer = optional_viewer(&*state.db.lock().await, &headers)?;
    let mode = FeedMode::Search(params.q);
    Ok(Json(build_feed(&state, viewer.as_ref(), &mode, params.page).await?))
}

pub async fn profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((server_ref, username, page)): Path<(String, String, u32)>,
) -> Result<Json<Profile>, ServerError> {
    // Forwarded into a peer URL as-is.
    validate_username(&username)?;

    let (viewer, server) = {
        let db = state.db.lock().await;
        (
            optional_viewer(&db, &headers)?,
            registry::resolve_server_ref(&db, &server_ref)?,
        )
    };
    Ok(Json(
        build_profile(&state, viewer.as_ref(), &server, &username, page).await?,
    ))
}

// ---------------------------------------------------------------------------
// Likes and comments
// ---------------------------------------------------------------------------

pub async fn like(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((server_ref, post_id)): Path<(String, Uuid)>,
) -> Result<Json<LikeResponse>, ServerError> {
    let (viewer, server) = {
        let db = state.db.lock().await;
        let viewer = require_viewer(&db, &headers)?;
        let server = reachable_server(&db, &viewer, &server_ref)?;

        if server.is_local {
            local_post(&db, post_id)?;
            let user = viewer_user(&db, &viewer)?;
            let success = db.add_like(post_id, server.id, Actor::Local(&user))?;
            return Ok(Json(LikeResponse {
                like_count: db.count_likes(post_id)?,
                success,
            }));
        }
        (viewer, server)
    };

    Ok(Json(
        state
            .fetcher
            .forward_like(&server, post_id, &viewer.username)
            .await,
    ))
}

pub async fn unlike(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((server_ref, post_id)): Path<(String, Uuid)>,
) -> Result<Json<LikeResponse>, ServerError> {
    let (viewer, server) = {
        let db = state.db.lock().await;
        let viewer = require_viewer(&db, &headers)?;
        let server = reachable_server(&db, &viewer, &server_ref)?;

        if server.is_local {
            local_post(&db, post_id)?;
            let success = db.remove_like(post_id, server.id, &viewer.username)?;
            return Ok(Json(LikeResponse {
                like_count: db.count_likes(post_id)?,
                success,
            }));
        }
        (viewer, server)
    };

    Ok(Json(
        state
            .fetcher
            .forward_unlike(&server, post_id, &viewer.username)
            .await,
    ))
}

pub async fn comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((server_ref, post_id)): Path<(String, Uuid)>,
    Json(req): Json<ContentRequest>,
) -> Result<Json<CommentOutcome>, ServerError> {
    let content = non_empty(&req.content)?;

    let (viewer, server) = {
        let db = state.db.lock().await;
        let viewer = require_viewer(&db, &headers)?;
        let server = reachable_server(&db, &viewer, &server_ref)?;

        if server.is_local {
            local_post(&db, post_id)?;
            let user = viewer_user(&db, &viewer)?;
            let comment = db.add_comment(post_id, server.id, Actor::Local(&user), content)?;
            return Ok(Json(CommentOutcome {
                success: true,
                comment: Some(comment.to_wire()),
            }));
        }
        (viewer, server)
    };

    let comment = state
        .fetcher
        .forward_comment(&server, post_id, &viewer.username, content)
        .await;
    Ok(Json(CommentOutcome {
        success: comment.is_some(),
        comment,
    }))
}

// ---------------------------------------------------------------------------
// Follows
// ---------------------------------------------------------------------------

pub async fn follow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((server_ref, username)): Path<(String, String)>,
) -> Result<Json<FollowState>, ServerError> {
    validate_username(&username)?;
    let db = state.db.lock().await;
    let viewer = require_viewer(&db, &headers)?;
    let server = registry::resolve_server_ref(&db, &server_ref)?;

    if server.is_local && username == viewer.username {
        return Err(ServerError::BadRequest("cannot follow yourself".into()));
    }
    if db.follow(viewer.user_id, &username, server.id)? {
        info!(follower = %viewer.username, followee = %username, server = %server.id, "follow");
    }
    Ok(Json(FollowState { following: true }))
}

pub async fn unfollow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((server_ref, username)): Path<(String, String)>,
) -> Result<Json<FollowState>, ServerError> {
    let db = state.db.lock().await;
    let viewer = require_viewer(&db, &headers)?;
    let server = registry::resolve_server_ref(&db, &server_ref)?;

    if !db.unfollow(viewer.user_id, &username, server.id)? {
        return Err(ServerError::NotFound(format!("follow of {username}")));
    }
    Ok(Json(FollowState { following: false }))
}

// ---------------------------------------------------------------------------
// Viewer blocklists
// ---------------------------------------------------------------------------

/// Blocking someone also drops the viewer's follow of them.
pub async fn block_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((server_ref, username)): Path<(String, String)>,
) -> Result<Json<BlockState>, ServerError> {
    let db = state.db.lock().await;
    let viewer = require_viewer(&db, &headers)?;
    let server = registry::resolve_server_ref(&db, &server_ref)?;

    if server.is_local && username == viewer.username {
        return Ok(Json(BlockState { blocked: false }));
    }

    db.block_user(viewer.user_id, &username, server.id)?;
    db.unfollow(viewer.user_id, &username, server.id)?;
    info!(viewer = %viewer.username, blocked = %username, server = %server.id, "user blocked");
    Ok(Json(BlockState { blocked: true }))
}

pub async fn unblock_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((server_ref, username)): Path<(String, String)>,
) -> Result<Json<BlockState>, ServerError> {
    let db = state.db.lock().await;
    let viewer = require_viewer(&db, &headers)?;
    let server = registry::resolve_server_ref(&db, &server_ref)?;

    db.unblock_user(viewer.user_id, &username, server.id)?;
    Ok(Json(BlockState { blocked: false }))
}

pub async fn block_server(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(addr): Json<ServerAddress>,
) -> Result<Json<BlockState>, ServerError> {
    let db = state.db.lock().await;
    let viewer = require_viewer(&db, &headers)?;
    let server = find_peer(&db, &addr)?;

    db.block_server(viewer.user_id, server.id)?;
    info!(viewer = %viewer.username, server = %server.base_url(), "server blocked by user");
    Ok(Json(BlockState { blocked: true }))
}

pub async fn unblock_server(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(addr): Json<ServerAddress>,
) -> Result<Json<BlockState>, ServerError> {
    let db = state.db.lock().await;
    let viewer = require_viewer(&db, &headers)?;
    let server = find_peer(&db, &addr)?;

    if !db.unblock_server(viewer.user_id, server.id)? {
        return Err(ServerError::NotFound(format!(
            "block of {}:{}",
            addr.ip, addr.port
        )));
    }
    Ok(Json(BlockState { blocked: false }))
}

/// `GET /federation/servers`: the registry with the viewer's own blocks marked.
pub async fn list_servers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ServerView>>, ServerError> {
    let db = state.db.lock().await;
    let viewer = optional_viewer(&db, &headers)?;

    let servers = db
        .list_servers()?
        .into_iter()
        .map(|server| ServerView {
            blocked_by_viewer: viewer
                .as_ref()
                .is_some_and(|v| v.has_blocked_server(server.id)),
            server,
        })
        .collect();
    Ok(Json(servers))
}
