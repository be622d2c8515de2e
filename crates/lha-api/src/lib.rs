//! HTTP API server for the LHA relay.
//!
//! Accepts authenticated toggle requests for logical targets and forwards
//! them to the configured transport.

pub mod auth;
pub mod dispatch;
pub mod handlers;
pub mod models;
pub mod network;
pub mod rate_limit;
pub mod server;
pub mod shutdown;
pub mod startup;

pub use auth::{AuthError, CredentialVerifier, Principal};
pub use dispatch::{CommandDispatcher, ToggleResponse};
pub use models::ApiError;
pub use rate_limit::{cleanup_task, extract_client_id, RateLimitConfig, RateLimitExceeded, RateLimiter};
pub use server::{build_publisher, build_state, create_router, run, ServerState};
