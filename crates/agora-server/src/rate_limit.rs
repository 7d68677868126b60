//! Token-bucket throttling keyed on caller IP and route family.
//!
//! Peers hit `/federation/*` on behalf of all their users at once, so that
//! family gets its own budget. A chatty peer cannot starve a local user
//! sharing its address of `/api/*`, and the reverse holds too.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::ServerConfig;

/// Route family a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Peer-to-peer and registry routes under `/federation/`.
    Federation,
    /// Everything else: the local user API, health and info.
    Local,
}

impl Scope {
    pub fn of_path(path: &str) -> Self {
        if path == "/federation" || path.starts_with("/federation/") {
            Scope::Federation
        } else {
            Scope::Local
        }
    }
}

/// Refill rate (tokens per second) and capacity of one bucket.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub per_sec: f64,
    pub burst: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    touched: Instant,
}

impl Bucket {
    fn spend(&mut self, budget: Budget, at: Instant) -> bool {
        let elapsed = at.saturating_duration_since(self.touched).as_secs_f64();
        self.tokens = (self.tokens + elapsed * budget.per_sec).min(budget.burst);
        self.touched = at;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<(IpAddr, Scope), Bucket>>>,
    federation: Budget,
    local: Budget,
}

impl RateLimiter {
    pub fn new(federation: Budget, local: Budget) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            federation,
            local,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            Budget {
                per_sec: config.federation_rate_limit_per_sec,
                burst: config.federation_rate_limit_burst,
            },
            Budget {
                per_sec: config.rate_limit_per_sec,
                burst: config.rate_limit_burst,
            },
        )
    }

    fn budget(&self, scope: Scope) -> Budget {
        match scope {
            Scope::Federation => self.federation,
            Scope::Local => self.local,
        }
    }

    /// Charge one request from `ip` against `scope`.
    pub async fn allow(&self, ip: IpAddr, scope: Scope) -> bool {
        let budget = self.budget(scope);
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry((ip, scope))
            .or_insert(Bucket {
                tokens: budget.burst,
                touched: now,
            })
            .spend(budget, now)
    }

    /// Forget callers quiet for at least `max_idle`.
    pub async fn evict_idle(&self, max_idle: Duration) {
        let now = Instant::now();
        self.buckets
            .lock()
            .await
            .retain(|_, bucket| now.saturating_duration_since(bucket.touched) < max_idle);
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().copied() else {
        return Ok(next.run(req).await);
    };
    let scope = Scope::of_path(req.uri().path());

    if !limiter.allow(addr.ip(), scope).await {
        warn!(ip = %addr.ip(), ?scope, path = req.uri().path(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;
    use crate::testutil::spawn_instance_with;

    fn fixed(burst: f64) -> Budget {
        Budget { per_sec: 0.0, burst }
    }

    #[test]
    fn paths_map_to_scopes() {
        assert_eq!(Scope::of_path("/federation/posts"), Scope::Federation);
        assert_eq!(Scope::of_path("/federation/like/abc"), Scope::Federation);
        assert_eq!(Scope::of_path("/api/feed/all/1"), Scope::Local);
        assert_eq!(Scope::of_path("/federationish"), Scope::Local);
        assert_eq!(Scope::of_path("/health"), Scope::Local);
    }

    #[tokio::test]
    async fn burst_then_throttle() {
        let limiter = RateLimiter::new(fixed(3.0), fixed(3.0));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.allow(ip, Scope::Local).await);
        }
        assert!(!limiter.allow(ip, Scope::Local).await);
    }

    #[tokio::test]
    async fn scopes_have_independent_budgets() {
        let limiter = RateLimiter::new(fixed(2.0), fixed(1.0));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(limiter.allow(ip, Scope::Local).await);
        assert!(!limiter.allow(ip, Scope::Local).await);

        assert!(limiter.allow(ip, Scope::Federation).await);
        assert!(limiter.allow(ip, Scope::Federation).await);
        assert!(!limiter.allow(ip, Scope::Federation).await);
    }

    #[tokio::test]
    async fn callers_do_not_share_buckets() {
        let limiter = RateLimiter::new(fixed(1.0), fixed(1.0));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.allow(a, Scope::Federation).await);
        assert!(!limiter.allow(a, Scope::Federation).await);
        assert!(limiter.allow(b, Scope::Federation).await);
    }

    #[tokio::test]
    async fn idle_buckets_are_evicted() {
        let limiter = RateLimiter::new(fixed(5.0), fixed(5.0));
        limiter.allow("192.168.1.1".parse().unwrap(), Scope::Local).await;

        limiter.evict_idle(Duration::ZERO).await;

        assert!(limiter.buckets.lock().await.is_empty());
    }

    #[tokio::test]
    async fn exhausted_api_budget_leaves_federation_open() {
        let node = spawn_instance_with(|config| {
            config.rate_limit_per_sec = 0.0;
            config.rate_limit_burst = 1.0;
        })
        .await;

        let first = node.client.get(node.url("/health")).send().await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = node.client.get(node.url("/health")).send().await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        let peers = node
            .client
            .post(node.url("/federation/posts"))
            .send()
            .await
            .unwrap();
        assert_eq!(peers.status(), StatusCode::OK);
    }
}
