//! Request pipeline: global budget, credential, toggle budget.
//!
//! Each stage either passes the request on or ends it with an [`ApiError`]
//! response. The router applies them in that order.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use super::types::ServerState;
use crate::auth::bearer_token;
use crate::models::ApiError;
use crate::rate_limit::{extract_client_id, RateLimiter};

async fn enforce_budget(
    limiter: &RateLimiter,
    state: &ServerState,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client_id = extract_client_id(
        request.headers(),
        connect_info.as_ref(),
        state.trust_forwarded_for(),
    );

    match limiter.check_rate_limit(&client_id).await {
        Ok(()) => next.run(request).await,
        Err(e) => {
            // Only log if this is the first warning in the debounce window
            if e.should_log() {
                tracing::warn!(
                    category = "rate_limit",
                    scope = e.scope,
                    client = %client_id,
                    wait_seconds = e.wait_seconds,
                    "Rate limit exceeded"
                );
            }
            ApiError::from(e).into_response()
        }
    }
}

/// Global budget, applied to every route.
pub async fn global_rate_limit_middleware(
    State(state): State<ServerState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    enforce_budget(&state.global_limiter, &state, connect_info, request, next).await
}

/// Toggle budget. Runs after [`auth_middleware`], so only authenticated requests count.
pub async fn toggle_rate_limit_middleware(
    State(state): State<ServerState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    enforce_budget(&state.toggle_limiter, &state, connect_info, request, next).await
}

/// Bearer credential check. Stores the [`Principal`](crate::auth::Principal) in the request extensions.
pub async fn auth_middleware(
    State(state): State<ServerState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let verified = bearer_token(request.headers()).and_then(|token| state.verifier.verify(token));

    match verified {
        Ok(principal) => {
            tracing::debug!(category = "auth", user = %principal.name, "Credential accepted");
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(
                category = "auth",
                path = %request.uri().path(),
                error = %e,
                "Credential rejected"
            );
            ApiError::from(e).into_response()
        }
    }
}
