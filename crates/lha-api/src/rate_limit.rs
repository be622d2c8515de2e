//! In-memory fixed-window rate limiting.
//!
//! Each client gets a counter and the start of its current window. The
//! counter resets the first time the client is seen after the window has
//! elapsed. Check, reset and count happen under one write lock.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::ConnectInfo, http::HeaderMap};
use lha_core::config::WindowSettings;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Identity used when neither the socket address nor a forwarded header is available.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub per_duration: Duration,
    /// Minimum duration between warning logs for the same client
    pub warn_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            per_duration: Duration::from_secs(60),
            warn_interval: Duration::from_secs(5),
        }
    }
}

impl RateLimitConfig {
    pub fn from_window(window: &WindowSettings) -> Self {
        Self {
            max_requests: window.max_requests,
            per_duration: window.window(),
            ..Self::default()
        }
    }
}

/// Rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Budget name for logs ("global", "toggle").
    scope: &'static str,
    clients: Arc<RwLock<HashMap<String, ClientState>>>,
    config: RateLimitConfig,
}

#[derive(Debug)]
struct ClientState {
    window_start: Instant,
    count: u32,
    last_warning: Option<Instant>,
}

impl RateLimiter {
    pub fn new(scope: &'static str, config: RateLimitConfig) -> Self {
        Self {
            scope,
            clients: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request for `client_key`, or reject it if the window is full.
    pub async fn check_rate_limit(&self, client_key: &str) -> Result<(), RateLimitExceeded> {
        let mut clients = self.clients.write().await;
        let now = Instant::now();

        let state = clients
            .entry(client_key.to_string())
            .or_insert_with(|| ClientState {
                window_start: now,
                count: 0,
                last_warning: None,
            });

        if now.saturating_duration_since(state.window_start) >= self.config.per_duration {
            state.window_start = now;
            state.count = 0;
            state.last_warning = None;
        }

        if state.count >= self.config.max_requests {
            let remaining = self
                .config
                .per_duration
                .saturating_sub(now.saturating_duration_since(state.window_start));
            // Round up so a client retrying after `retry_after` lands in the next window.
            let wait_seconds = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);

            let should_log = match state.last_warning {
                Some(last) => now.saturating_duration_since(last) >= self.config.warn_interval,
                None => true,
            };
            if should_log {
                state.last_warning = Some(now);
            }

            return Err(RateLimitExceeded {
                scope: self.scope,
                wait_seconds,
                should_log,
            });
        }

        state.count += 1;
        Ok(())
    }

    /// Drop clients whose window has expired.
    pub async fn cleanup_old_entries(&self) {
        let mut clients = self.clients.write().await;
        let now = Instant::now();
        let window = self.config.per_duration;
        clients.retain(|_key, state| now.saturating_duration_since(state.window_start) < window);
    }

    /// Number of tracked clients.
    pub async fn tracked_clients(&self) -> usize {
        self.clients.read().await.len()
    }
}

/// Rate limit exceeded error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub scope: &'static str,
    pub wait_seconds: u64,
    should_log: bool,
}

impl RateLimitExceeded {
    /// Whether this rejection should be logged (debounced per client).
    pub fn should_log(&self) -> bool {
        self.should_log
    }
}

/// Client identity for rate limiting: the peer IP, or the first
/// `X-Forwarded-For` entry when `trust_forwarded_for` is set.
///
/// Keyed on the network origin, not the principal: clients sharing one NAT
/// address share one budget.
pub fn extract_client_id(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    match connect_info {
        Some(info) => info.0.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

/// Background task to periodically clean up old rate limit entries.
pub async fn cleanup_task(limiter: Arc<RateLimiter>, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);
    loop {
        interval_timer.tick().await;
        limiter.cleanup_old_entries().await;
        let remaining = limiter.tracked_clients().await;
        tracing::debug!(
            category = "rate_limit",
            scope = limiter.scope(),
            clients = remaining,
            "Pruned idle rate limit entries"
        );
    }
}
