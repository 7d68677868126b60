//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so an instance can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use agora_shared::constants::{
    DEFAULT_HTTP_PORT, MAX_PEER_RESPONSE_BYTES, PEER_TIMEOUT_SECS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8000`
    pub http_addr: SocketAddr,

    /// Port announced to peers in federation requests. Peers look us up in
    /// their registry by our source IP plus this port, so it must match the
    /// port they registered us under.
    /// Env: `PUBLIC_PORT`
    /// Default: the port of `http_addr`.
    pub public_port: u16,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None` (platform data directory).
    pub database_path: Option<PathBuf>,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Agora Node"`
    pub instance_name: String,

    /// Admin API bearer token. Required for peer management.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (admin API disabled).
    pub admin_token: Option<String>,

    /// Timeout applied to each outbound peer request.
    /// Env: `PEER_TIMEOUT_SECS`
    /// Default: `5`
    pub peer_timeout: Duration,

    /// Largest peer response body we are willing to parse.
    /// Env: `MAX_PEER_RESPONSE_BYTES`
    /// Default: 4 MiB
    pub max_peer_response_bytes: usize,

    /// Register unknown peers the first time they call a federation endpoint.
    /// Env: `FEDERATION_AUTO_REGISTER` (true/false)
    /// Default: `true`
    pub federation_auto_register: bool,

    /// Per-IP token refill rate for the local API and other non-federation routes.
    /// Env: `RATE_LIMIT_PER_SEC`
    /// Default: `10`
    pub rate_limit_per_sec: f64,

    /// Per-IP bucket capacity for the local API.
    /// Env: `RATE_LIMIT_BURST`
    /// Default: `30`
    pub rate_limit_burst: f64,

    /// Per-IP token refill rate for `/federation/*`.
    /// Env: `FEDERATION_RATE_LIMIT_PER_SEC`
    /// Default: `20`
    pub federation_rate_limit_per_sec: f64,

    /// Per-IP bucket capacity for `/federation/*`.
    /// Env: `FEDERATION_RATE_LIMIT_BURST`
    /// Default: `60`
    pub federation_rate_limit_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            public_port: DEFAULT_HTTP_PORT,
            database_path: None,
            instance_name: "Agora Node".to_string(),
            admin_token: None,
            peer_timeout: Duration::from_secs(PEER_TIMEOUT_SECS),
            max_peer_response_bytes: MAX_PEER_RESPONSE_BYTES,
            federation_auto_register: true,
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
            federation_rate_limit_per_sec: 20.0,
            federation_rate_limit_burst: 60.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = get("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        config.public_port = config.http_addr.port();
        if let Some(val) = get("PUBLIC_PORT") {
            match val.parse::<u16>() {
                Ok(port) => config.public_port = port,
                Err(_) => tracing::warn!(value = %val, "Invalid PUBLIC_PORT, using listen port"),
            }
        }

        if let Some(path) = get("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(name) = get("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Some(token) = get("ADMIN_TOKEN") {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }

        if let Some(val) = get("PEER_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.peer_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid PEER_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(val) = get("MAX_PEER_RESPONSE_BYTES") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_peer_response_bytes = n;
            }
        }

        if let Some(val) = get("FEDERATION_AUTO_REGISTER") {
            config.federation_auto_register = val != "false" && val != "0";
        }

        if let Some(val) = get("RATE_LIMIT_PER_SEC") {
            if let Ok(n) = val.parse::<f64>() {
                config.rate_limit_per_sec = n;
            }
        }

        if let Some(val) = get("RATE_LIMIT_BURST") {
            if let Ok(n) = val.parse::<f64>() {
                config.rate_limit_burst = n;
            }
        }

        if let Some(val) = get("FEDERATION_RATE_LIMIT_PER_SEC") {
            if let Ok(n) = val.parse::<f64>() {
                config.federation_rate_limit_per_sec = n;
            }
        }

        if let Some(val) = get("FEDERATION_RATE_LIMIT_BURST") {
            if let Ok(n) = val.parse::<f64>() {
                config.federation_rate_limit_burst = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}
