//! Server state shared by every handler and middleware.

use std::sync::Arc;

use lha_core::RelayConfig;

use crate::auth::CredentialVerifier;
use crate::dispatch::CommandDispatcher;
use crate::rate_limit::{RateLimitConfig, RateLimiter};

/// Maximum request body size. The endpoints take no body.
pub const MAX_REQUEST_BODY_SIZE: usize = 16 * 1024;

/// Server state.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<RelayConfig>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub verifier: Arc<CredentialVerifier>,
    /// Budget over every endpoint.
    pub global_limiter: Arc<RateLimiter>,
    /// Budget over the toggle endpoints, counted after authentication.
    pub toggle_limiter: Arc<RateLimiter>,
    /// Server start timestamp
    pub started_at: i64,
}

impl ServerState {
    pub fn new(config: Arc<RelayConfig>, dispatcher: Arc<CommandDispatcher>) -> Self {
        let verifier = Arc::new(CredentialVerifier::new(&config.auth.jwt_secret));
        let global_limiter = Arc::new(RateLimiter::new(
            "global",
            RateLimitConfig::from_window(&config.rate_limit.global),
        ));
        let toggle_limiter = Arc::new(RateLimiter::new(
            "toggle",
            RateLimitConfig::from_window(&config.rate_limit.toggle),
        ));

        Self {
            config,
            dispatcher,
            verifier,
            global_limiter,
            toggle_limiter,
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn trust_forwarded_for(&self) -> bool {
        self.config.server.trust_forwarded_for
    }
}
