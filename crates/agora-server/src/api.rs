use std::net::SocketAddr;
use std::sync::Arc;

use agora_shared::error::AgoraError;
use agora_shared::wire::{de_port, ServerAddress};
use agora_store::{Database, Server};
use anyhow::Context;
use axum::{
    extract::State,
    http::{HeaderMap, Method},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::actions;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::federation;
use crate::fetcher::PeerFetcher;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub fetcher: PeerFetcher,
    /// This instance's registry row, resolved once at startup.
    pub local: Arc<Server>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wrap an opened database. The local server row must already exist.
    pub fn new(db: Database, config: ServerConfig) -> anyhow::Result<Self> {
        let local = db
            .get_local_server()
            .context("no local server entry in the registry")?;
        let fetcher = PeerFetcher::new(&config).context("failed to build HTTP client")?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            fetcher,
            local: Arc::new(local),
            rate_limiter: RateLimiter::from_config(&config),
            config: Arc::new(config),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        // Peer-to-peer protocol
        .route("/federation/posts", get(federation::posts).post(federation::posts))
        .route("/federation/user/:username", get(federation::user))
        .route("/federation/like/:post_id", post(federation::like))
        .route("/federation/unlike/:post_id", post(federation::unlike))
        .route("/federation/comment/:post_id", post(federation::comment))
        // Registry management
        .route("/federation/add_servers", post(admin_add_server))
        .route("/federation/delete_server", post(admin_delete_server))
        .route("/federation/global_block", post(admin_global_block))
        .route("/federation/servers", get(actions::list_servers))
        .route("/federation/block_server", post(actions::block_server))
        .route("/federation/unblock_server", post(actions::unblock_server))
        .route(
            "/federation/block_user/:server_id/:username",
            get(actions::block_user),
        )
        .route(
            "/federation/unblock_user/:server_id/:username",
            get(actions::unblock_user),
        )
        // Local users
        .route("/api/register", post(actions::register))
        .route("/api/posts", post(actions::create_post))
        .route("/api/posts/:id/edit", post(actions::edit_post))
        .route("/api/feed/all/:page", get(actions::feed_all))
        .route("/api/feed/following/:page", get(actions::feed_following))
        .route("/api/search", get(actions::search))
        .route("/api/user/:server_id/:username/:page", get(actions::profile))
        .route("/api/like/:server_id/:post_id", post(actions::like))
        .route("/api/unlike/:server_id/:post_id", post(actions::unlike))
        .route("/api/comment/:server_id/:post_id", post(actions::comment))
        .route("/api/follow/:server_id/:username", post(actions::follow))
        .route("/api/unfollow/:server_id/:username", post(actions::unfollow))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize, Deserialize)]
struct ServerInfoResponse {
    name: String,
    version: String,
    server_id: Uuid,
    port: u16,
    peers: usize,
}

#[derive(Deserialize)]
struct GlobalBlockRequest {
    ip: String,
    #[serde(deserialize_with = "de_port")]
    port: u16,
    blocked: bool,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Result<Json<ServerInfoResponse>, ServerError> {
    let peers = state
        .db
        .lock()
        .await
        .list_servers()?
        .iter()
        .filter(|s| !s.is_local)
        .count();

    Ok(Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        server_id: state.local.id,
        port: state.local.port,
        peers,
    }))
}

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Unauthorized(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Unauthorized("Invalid admin token".into()));
    }

    Ok(())
}

fn registered_peer(db: &Database, ip: &str, port: u16) -> Result<Server, ServerError> {
    if Server::is_local_address(ip) {
        return Err(ServerError::BadRequest("the local server cannot be modified".into()));
    }
    db.find_server(ip, port)?
        .ok_or_else(|| ServerError::NotFound(format!("server {ip}:{port}")))
}

async fn admin_add_server(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<ServerAddress>,
) -> Result<Json<Server>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let ip = req.ip.trim();
    if ip.is_empty() || Server::is_local_address(ip) {
        return Err(ServerError::BadRequest(format!("invalid peer address {ip:?}")));
    }
    if req.port == 0 {
        return Err(AgoraError::InvalidPort("must be non-zero".into()).into());
    }

    let server = state.db.lock().await.upsert_server(ip, req.port)?;
    info!(peer = %server.base_url(), id = %server.id, "Admin added peer");
    Ok(Json(server))
}

async fn admin_delete_server(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<ServerAddress>,
) -> Result<Json<serde_json::Value>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let db = state.db.lock().await;
    let server = registered_peer(&db, &req.ip, req.port)?;
    db.delete_server(server.id)?;

    info!(peer = %server.base_url(), "Admin deleted peer");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn admin_global_block(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<GlobalBlockRequest>,
) -> Result<Json<Server>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let db = state.db.lock().await;
    let server = registered_peer(&db, &req.ip, req.port)?;
    db.set_server_blocked(server.id, req.blocked)?;

    info!(peer = %server.base_url(), blocked = req.blocked, "Admin changed global block");
    Ok(Json(Server {
        blocked: req.blocked,
        ..server
    }))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting HTTP API server");
    serve_on(listener, state).await
}

/// Serve on an already-bound listener. Peer identification needs the
/// connection's remote address, so the service is built with connect info.
pub async fn serve_on(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::testutil::{spawn_instance, ADMIN_TOKEN};

    #[tokio::test]
    async fn health_and_info() {
        let node = spawn_instance().await;

        let health = node.client.get(node.url("/health")).send().await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let info: ServerInfoResponse = node
            .client
            .get(node.url("/info"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info.server_id, node.state.local.id);
        assert_eq!(info.port, node.addr.port());
        assert_eq!(info.peers, 0);
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let node = spawn_instance().await;
        let body = json!({ "ip": "10.0.0.2", "port": 8000 });

        let missing = node
            .client
            .post(node.url("/federation/add_servers"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::FORBIDDEN);

        let wrong = node
            .client
            .post(node.url("/federation/add_servers"))
            .bearer_auth("not-the-token")
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
        assert!(node.state.db.lock().await.find_server("10.0.0.2", 8000).unwrap().is_none());
    }

    #[tokio::test]
    async fn admin_manages_peers() {
        let node = spawn_instance().await;
        let admin = |path: &str, body: serde_json::Value| {
            node.client
                .post(node.url(path))
                .bearer_auth(ADMIN_TOKEN)
                .json(&body)
                .send()
        };

        let added: Server = admin("/federation/add_servers", json!({ "ip": "10.0.0.2", "port": "8000" }))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let again: Server = admin("/federation/add_servers", json!({ "ip": "10.0.0.2", "port": 8000 }))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(added.id, again.id);

        let blocked: Server = admin(
            "/federation/global_block",
            json!({ "ip": "10.0.0.2", "port": 8000, "blocked": true }),
        )
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
        assert!(blocked.blocked);
        assert!(node.state.db.lock().await.get_server(added.id).unwrap().blocked);

        let local = admin("/federation/add_servers", json!({ "ip": "local", "port": 8000 }))
            .await
            .unwrap();
        assert_eq!(local.status(), StatusCode::BAD_REQUEST);

        let local_delete = admin(
            "/federation/delete_server",
            json!({ "ip": "local", "port": node.addr.port() }),
        )
        .await
        .unwrap();
        assert_eq!(local_delete.status(), StatusCode::BAD_REQUEST);

        let deleted = admin("/federation/delete_server", json!({ "ip": "10.0.0.2", "port": 8000 }))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);
        assert!(node.state.db.lock().await.find_server("10.0.0.2", 8000).unwrap().is_none());

        let gone = admin("/federation/delete_server", json!({ "ip": "10.0.0.2", "port": 8000 }))
            .await
            .unwrap();
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    }
}
