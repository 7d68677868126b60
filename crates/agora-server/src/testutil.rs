//! Shared fixtures: throwaway instances backed by a temp database, and stub
//! peers served from loopback.

use std::net::SocketAddr;
use std::time::Duration;

use agora_shared::wire::WirePost;
use agora_store::{Database, Server};
use axum::Router;
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use crate::api::{serve_on, AppState};
use crate::config::ServerConfig;

pub const ADMIN_TOKEN: &str = "test-admin-token";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_addr: ([127, 0, 0, 1], 0).into(),
        admin_token: Some(ADMIN_TOKEN.to_string()),
        peer_timeout: Duration::from_secs(2),
        rate_limit_burst: 10_000.0,
        rate_limit_per_sec: 10_000.0,
        federation_rate_limit_burst: 10_000.0,
        federation_rate_limit_per_sec: 10_000.0,
        ..Default::default()
    }
}

pub fn test_state() -> (AppState, TempDir) {
    test_state_with(test_config())
}

pub fn test_state_with(config: ServerConfig) -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Database::open_at(&dir.path().join("agora.db")).unwrap();
    db.ensure_local_server(config.public_port).unwrap();
    (AppState::new(db, config).unwrap(), dir)
}

pub struct TestInstance {
    pub addr: SocketAddr,
    pub state: AppState,
    pub client: reqwest::Client,
    _dir: TempDir,
}

impl TestInstance {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// A full instance listening on an ephemeral loopback port, announcing that
/// port to its peers.
pub async fn spawn_instance() -> TestInstance {
    spawn_instance_with(|_| {}).await
}

/// Like [`spawn_instance`], with the test config adjusted first.
pub async fn spawn_instance_with(tweak: impl FnOnce(&mut ServerConfig)) -> TestInstance {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ServerConfig {
        http_addr: addr,
        public_port: addr.port(),
        ..test_config()
    };
    tweak(&mut config);
    let (state, dir) = test_state_with(config);

    let served = state.clone();
    tokio::spawn(async move {
        let _ = serve_on(listener, served).await;
    });

    TestInstance {
        addr,
        state,
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

pub async fn spawn_stub(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    serve_stub(listener, router)
}

/// Serve `router` on a listener the caller already bound.
pub fn serve_stub(listener: tokio::net::TcpListener, router: Router) -> SocketAddr {
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// A loopback port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// A registry row for a loopback peer, not persisted anywhere.
pub fn peer_record(port: u16) -> Server {
    Server {
        id: Uuid::new_v4(),
        address: "127.0.0.1".to_string(),
        port,
        is_local: false,
        blocked: false,
        created_at: Utc::now(),
    }
}

pub fn wire_post(username: &str, content: &str) -> WirePost {
    WirePost {
        id: Uuid::new_v4(),
        content: content.to_string(),
        timestamp: Utc::now(),
        username: username.to_string(),
        likes: 0,
        comments: Vec::new(),
        liked: false,
    }
}
