//! Feed and profile assembly.
//!
//! Local posts are read under the database lock, the lock is released, and
//! every reachable peer is queried concurrently. Results are filtered per
//! viewer, de-duplicated, sorted newest first and cut into pages.

use std::collections::HashSet;

use agora_shared::constants::PAGE_SIZE;
use agora_shared::types::{FeedItem, Origin};
use agora_shared::visibility::{visible, FeedMode, Viewer};
use agora_store::{Database, PostQuery, Server, StoreError};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::ServerError;
use crate::registry;

/// One page of an ordered listing. Page numbers start at 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub total_pages: u32,
    pub previous_page: Option<u32>,
    pub next_page: Option<u32>,
}

/// Cut `items` into pages of `page_size`. Out-of-range requests are clamped
/// to the nearest valid page, and an empty listing still has one page.
pub fn paginate<T>(items: Vec<T>, requested: u32, page_size: usize) -> Page<T> {
    let total_pages = items.len().div_ceil(page_size).max(1) as u32;
    let page = requested.clamp(1, total_pages);
    let start = (page as usize - 1) * page_size;

    Page {
        items: items.into_iter().skip(start).take(page_size).collect(),
        page,
        total_pages,
        previous_page: (page > 1).then(|| page - 1),
        next_page: (page < total_pages).then(|| page + 1),
    }
}

/// Apply visibility, mark followed authors, drop duplicates and sort newest
/// first. Among equal timestamps the input order is kept.
pub fn merge(
    items: impl IntoIterator<Item = FeedItem>,
    viewer: Option<&Viewer>,
    mode: &FeedMode,
) -> Vec<FeedItem> {
    let mut seen = HashSet::new();
    let mut merged: Vec<FeedItem> = items
        .into_iter()
        .filter(|item| visible(item, viewer, mode))
        .filter(|item| seen.insert((item.origin.server_id, item.id)))
        .map(|mut item| {
            item.following = viewer.is_some_and(|v| v.follows(&item.username, item.origin.server_id));
            item
        })
        .collect();

    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    merged
}

/// Local posts as feed items, with `liked` computed for the viewer.
fn local_items(
    db: &Database,
    local: &Server,
    viewer: Option<&Viewer>,
    author: Option<Uuid>,
) -> Result<Vec<FeedItem>, StoreError> {
    let posts = db.list_enriched_posts(PostQuery {
        author,
        liked_by: viewer.map(|v| (v.username.as_str(), local.id)),
    })?;

    let origin = local.origin();
    Ok(posts
        .iter()
        .map(|p| FeedItem::from_wire(p.to_wire(), origin.clone()))
        .collect())
}

pub async fn build_feed(
    state: &AppState,
    viewer: Option<&Viewer>,
    mode: &FeedMode,
    page: u32,
) -> Result<Page<FeedItem>, ServerError> {
    let (local, peers) = {
        let db = state.db.lock().await;
        (
            local_items(&db, &state.local, viewer, None)?,
            registry::peers_for_viewer(&db, viewer)?,
        )
    };

    let requester = viewer.map(|v| v.username.as_str());
    let remote = join_all(
        peers
            .iter()
            .map(|peer| state.fetcher.fetch_peer_posts(peer, requester)),
    )
    .await;

    debug!(
        local = local.len(),
        peers = peers.len(),
        remote = remote.iter().map(Vec::len).sum::<usize>(),
        ?mode,
        "assembling feed"
    );

    let merged = merge(local.into_iter().chain(remote.into_iter().flatten()), viewer, mode);
    Ok(paginate(merged, page, PAGE_SIZE))
}

/// A user's page, local or on a peer.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub username: String,
    pub server: Origin,
    pub followers: u64,
    pub following: u64,
    pub followed_by_viewer: bool,
    pub is_viewer: bool,
    pub posts: Page<FeedItem>,
}

pub async fn build_profile(
    state: &AppState,
    viewer: Option<&Viewer>,
    server: &Server,
    username: &str,
    page: u32,
) -> Result<Profile, ServerError> {
    let (posts, followers, following) = if server.is_local {
        let db = state.db.lock().await;
        let user = match db.get_user_by_username(username) {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                return Err(ServerError::NotFound(format!("user {username}")))
            }
            Err(e) => return Err(e.into()),
        };
        (
            local_items(&db, server, viewer, Some(user.id))?,
            db.count_followers(username, server.id)?,
            db.count_following(user.id)?,
        )
    } else {
        if registry::is_blocked_for_viewer(server, viewer) {
            return Err(ServerError::NotFound("server unavailable".into()));
        }
        let local_followers = state.db.lock().await.count_followers(username, server.id)?;

        let remote = state
            .fetcher
            .fetch_peer_user(server, username)
            .await
            .ok_or_else(|| ServerError::NotFound(format!("user {username}")))?;
        (
            remote.posts,
            remote.followers.saturating_add(local_followers),
            remote.following,
        )
    };

    let posts = merge(posts, viewer, &FeedMode::All);

    Ok(Profile {
        username: username.to_string(),
        server: server.origin(),
        followers,
        following,
        followed_by_viewer: viewer.is_some_and(|v| v.follows(username, server.id)),
        is_viewer: server.is_local && viewer.is_some_and(|v| v.username == username),
        posts: paginate(posts, page, PAGE_SIZE),
    })
}
