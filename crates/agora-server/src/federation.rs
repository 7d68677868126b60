//! Endpoints other instances call.
//!
//! Peers are not authenticated beyond their source address: the caller is
//! identified by its IP and the port it says it serves on, looked up in (or
//! added to) the registry. Bodies are parsed from raw bytes because peers do
//! not reliably send a JSON content type.

use std::net::SocketAddr;

use agora_shared::types::validate_username;
use agora_shared::wire::{
    ActorRequest, CommentRequest, CommentResponse, LikeResponse, PostsRequest, PostsResponse,
    UserProfileResponse,
};
use agora_store::{Actor, Database, PostQuery, Server, StoreError};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::Json;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::ServerError;
use crate::registry;

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ServerError> {
    serde_json::from_slice(body).map_err(|e| ServerError::BadRequest(format!("malformed body: {e}")))
}

fn require_post(db: &Database, id: Uuid) -> Result<(), ServerError> {
    match db.get_post(id) {
        Ok(_) => Ok(()),
        Err(StoreError::NotFound) => Err(ServerError::NotFound(format!("post {id}"))),
        Err(e) => Err(e.into()),
    }
}

fn caller(state: &AppState, db: &Database, addr: SocketAddr, port: u16) -> Result<Server, ServerError> {
    registry::resolve_caller(db, addr.ip(), port, state.config.federation_auto_register)
}

/// `GET|POST /federation/posts`: every local post, with `liked` computed for
/// the requesting user on the calling server. An empty body means an
/// anonymous request from an unidentified caller.
pub async fn posts(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<Json<PostsResponse>, ServerError> {
    let request: Option<PostsRequest> = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(parse_body(&body)?)
    };

    let db = state.db.lock().await;
    let liked_by = match &request {
        Some(req) => {
            let peer = caller(&state, &db, addr, req.port)?;
            req.username.as_deref().map(|name| (name, peer.id))
        }
        None => {
            registry::refuse_blocked_address(&db, addr.ip())?;
            None
        }
    };

    let posts = db
        .list_enriched_posts(PostQuery {
            author: None,
            liked_by,
        })?
        .iter()
        .map(|p| p.to_wire())
        .collect::<Vec<_>>();

    debug!(peer = %addr, count = posts.len(), "served posts to peer");
    Ok(Json(PostsResponse { posts }))
}

/// `GET /federation/user/:username`
pub async fn user(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(username): Path<String>,
) -> Result<Json<UserProfileResponse>, ServerError> {
    let db = state.db.lock().await;
    registry::refuse_blocked_address(&db, addr.ip())?;

    let user = match db.get_user_by_username(&username) {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(ServerError::NotFound(format!("user {username}"))),
        Err(e) => return Err(e.into()),
    };

    let posts = db
        .list_enriched_posts(PostQuery {
            author: Some(user.id),
            liked_by: None,
        })?
        .iter()
        .map(|p| p.to_wire())
        .collect();

    Ok(Json(UserProfileResponse {
        followers: db.count_followers(&user.username, state.local.id)?,
        following_users: db.count_following(user.id)?,
        username: user.username,
        posts,
    }))
}

/// `POST /federation/like/:post_id`. Liking twice is not an error; the second
/// call reports `success: false`.
pub async fn like(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(post_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<LikeResponse>, ServerError> {
    let req: ActorRequest = parse_body(&body)?;
    validate_username(&req.username)?;

    let db = state.db.lock().await;
    let peer = caller(&state, &db, addr, req.port)?;
    require_post(&db, post_id)?;

    let success = db.add_like(
        post_id,
        peer.id,
        Actor::Remote {
            username: &req.username,
        },
    )?;
    if success {
        info!(%post_id, peer = %peer.base_url(), username = %req.username, "remote like");
    }

    Ok(Json(LikeResponse {
        like_count: db.count_likes(post_id)?,
        success,
    }))
}

/// `POST /federation/unlike/:post_id`
pub async fn unlike(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(post_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<LikeResponse>, ServerError> {
    let req: ActorRequest = parse_body(&body)?;
    validate_username(&req.username)?;

    let db = state.db.lock().await;
    let peer = caller(&state, &db, addr, req.port)?;
    require_post(&db, post_id)?;

    let success = db.remove_like(post_id, peer.id, &req.username)?;

    Ok(Json(LikeResponse {
        like_count: db.count_likes(post_id)?,
        success,
    }))
}

/// `POST /federation/comment/:post_id`
pub async fn comment(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(post_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<CommentResponse>, ServerError> {
    let req: CommentRequest = parse_body(&body)?;
    validate_username(&req.username)?;
    if req.content.trim().is_empty() {
        return Err(ServerError::BadRequest("empty comment".into()));
    }

    let db = state.db.lock().await;
    let peer = caller(&state, &db, addr, req.port)?;
    require_post(&db, post_id)?;

    let comment = db.add_comment(
        post_id,
        peer.id,
        Actor::Remote {
            username: &req.username,
        },
        &req.content,
    )?;
    info!(%post_id, peer = %peer.base_url(), username = %req.username, "remote comment");

    Ok(Json(CommentResponse {
        comment: comment.to_wire(),
    }))
}

#[cfg(test)]
mod tests {
    use agora_shared::wire::WireComment;
    use reqwest::StatusCode;

    use super::*;
    use crate::testutil::spawn_instance;

    #[tokio::test]
    async fn posts_report_liked_for_the_calling_server() {
        let node = spawn_instance().await;
        let post_id = {
            let db = node.state.db.lock().await;
            let ann = db.create_user("ann").unwrap();
            db.create_post(ann.id, "hello").unwrap().id
        };

        // The test client calls from 127.0.0.1 and claims port 9001.
        let resp: LikeResponse = node
            .client
            .post(node.url(&format!("/federation/like/{post_id}")))
            .body(r#"{"username": "bob", "port": "9001"}"#)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp, LikeResponse { like_count: 1, success: true });

        let as_bob: PostsResponse = node
            .client
            .post(node.url("/federation/posts"))
            .json(&PostsRequest { username: Some("bob".into()), port: 9001 })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(as_bob.posts[0].liked);
        assert_eq!(as_bob.posts[0].likes, 1);

        // Same username, different server: a different person.
        let as_other_bob: PostsResponse = node
            .client
            .post(node.url("/federation/posts"))
            .json(&PostsRequest { username: Some("bob".into()), port: 9002 })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(!as_other_bob.posts[0].liked);

        let anonymous: PostsResponse = node
            .client
            .get(node.url("/federation/posts"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(anonymous.posts.len(), 1);
        assert!(!anonymous.posts[0].liked);
    }

    #[tokio::test]
    async fn like_is_idempotent_and_unlike_reverts() {
        let node = spawn_instance().await;
        let post_id = {
            let db = node.state.db.lock().await;
            let ann = db.create_user("ann").unwrap();
            db.create_post(ann.id, "hello").unwrap().id
        };
        let like_url = node.url(&format!("/federation/like/{post_id}"));
        let unlike_url = node.url(&format!("/federation/unlike/{post_id}"));
        let body = ActorRequest { username: "bob".into(), port: 9001 };

        let first: LikeResponse = node.client.post(&like_url).json(&body).send().await.unwrap().json().await.unwrap();
        let second: LikeResponse = node.client.post(&like_url).json(&body).send().await.unwrap().json().await.unwrap();
        assert_eq!(first, LikeResponse { like_count: 1, success: true });
        assert_eq!(second, LikeResponse { like_count: 1, success: false });

        let undone: LikeResponse = node.client.post(&unlike_url).json(&body).send().await.unwrap().json().await.unwrap();
        assert_eq!(undone, LikeResponse { like_count: 0, success: true });
        let again: LikeResponse = node.client.post(&unlike_url).json(&body).send().await.unwrap().json().await.unwrap();
        assert_eq!(again, LikeResponse { like_count: 0, success: false });
    }

    #[tokio::test]
    async fn comment_is_stored_under_the_calling_server() {
        let node = spawn_instance().await;
        let post_id = {
            let db = node.state.db.lock().await;
            let ann = db.create_user("ann").unwrap();
            db.create_post(ann.id, "hello").unwrap().id
        };

        let resp: serde_json::Value = node
            .client
            .post(node.url(&format!("/federation/comment/{post_id}")))
            .json(&CommentRequest { username: "bob".into(), content: "nice".into(), port: 9001 })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let comment: WireComment = serde_json::from_value(resp["Comment"].clone()).unwrap();
        assert_eq!(comment.content, "nice");
        assert_eq!(comment.username, "bob");

        let db = node.state.db.lock().await;
        let peer = db.find_server("127.0.0.1", 9001).unwrap().unwrap();
        let stored = db.list_comments(post_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].server_id, peer.id);
        assert!(stored[0].user_id.is_none());
    }

    #[tokio::test]
    async fn unknown_post_and_bad_bodies() {
        let node = spawn_instance().await;
        let body = ActorRequest { username: "bob".into(), port: 9001 };

        let missing = node
            .client
            .post(node.url(&format!("/federation/like/{}", Uuid::new_v4())))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let garbage = node
            .client
            .post(node.url(&format!("/federation/like/{}", Uuid::new_v4())))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unlike_rejects_malformed_username() {
        let node = spawn_instance().await;
        let post_id = {
            let db = node.state.db.lock().await;
            let ann = db.create_user("ann").unwrap();
            db.create_post(ann.id, "hello").unwrap().id
        };

        let resp = node
            .client
            .post(node.url(&format!("/federation/unlike/{post_id}")))
            .body(r#"{"username": "bad name!", "port": 9001}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(node.state.db.lock().await.find_server("127.0.0.1", 9001).unwrap().is_none());
    }

    #[tokio::test]
    async fn globally_blocked_caller_is_refused() {
        let node = spawn_instance().await;
        let post_id = {
            let db = node.state.db.lock().await;
            let ann = db.create_user("ann").unwrap();
            let peer = db.upsert_server("127.0.0.1", 9001).unwrap();
            db.set_server_blocked(peer.id, true).unwrap();
            db.create_post(ann.id, "hello").unwrap().id
        };

        let like = node
            .client
            .post(node.url(&format!("/federation/like/{post_id}")))
            .json(&ActorRequest { username: "bob".into(), port: 9001 })
            .send()
            .await
            .unwrap();
        assert_eq!(like.status(), StatusCode::FORBIDDEN);

        let posts = node
            .client
            .post(node.url("/federation/posts"))
            .json(&PostsRequest { username: None, port: 9001 })
            .send()
            .await
            .unwrap();
        assert_eq!(posts.status(), StatusCode::FORBIDDEN);

        assert_eq!(node.state.db.lock().await.count_likes(post_id).unwrap(), 0);
    }

    #[tokio::test]
    async fn user_endpoint_serves_profile() {
        let node = spawn_instance().await;
        {
            let db = node.state.db.lock().await;
            let ann = db.create_user("ann").unwrap();
            let bob = db.create_user("bob").unwrap();
            db.create_post(ann.id, "hello").unwrap();
            db.follow(bob.id, "ann", node.state.local.id).unwrap();
        }

        let profile: UserProfileResponse = node
            .client
            .get(node.url("/federation/user/ann"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(profile.username, "ann");
        assert_eq!(profile.posts.len(), 1);
        assert_eq!(profile.followers, 1);
        assert_eq!(profile.following_users, 0);

        let missing = node
            .client
            .get(node.url("/federation/user/ghost"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
