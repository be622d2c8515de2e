//! Router configuration.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

use super::middleware::{auth_middleware, global_rate_limit_middleware, toggle_rate_limit_middleware};
use super::types::{ServerState, MAX_REQUEST_BODY_SIZE};
use crate::handlers;

/// Create the router.
///
/// Layer order, outermost first: body limit, global budget, credential,
/// toggle budget, handler. `/` only passes the global budget.
pub fn create_router(state: ServerState) -> Router {
    let toggle_routes = Router::new()
        .route("/garage/:side", post(handlers::toggle::garage_handler))
        .route("/gate", post(handlers::toggle::gate_handler))
        // route_layer: the last one added runs first.
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            toggle_rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/", get(handlers::basic::root_handler))
        .merge(toggle_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_SIZE))
        .with_state(state)
}
