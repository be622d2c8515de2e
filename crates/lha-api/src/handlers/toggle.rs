//! Toggle endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::ServerState;
use crate::auth::Principal;
use crate::dispatch::ToggleResponse;
use crate::models::ApiResult;

/// Target used by `POST /gate`.
pub const GATE_TARGET: &str = "gate";

/// `POST /garage/:side`.
pub async fn garage_handler(
    State(state): State<ServerState>,
    Extension(principal): Extension<Principal>,
    Path(side): Path<String>,
) -> ApiResult<Json<ToggleResponse>> {
    tracing::info!(category = "dispatch", user = %principal.name, side = %side, "Toggle requested");
    state.dispatcher.toggle(&side).await.map(Json)
}

/// `POST /gate`.
pub async fn gate_handler(
    State(state): State<ServerState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<ToggleResponse>> {
    tracing::info!(category = "dispatch", user = %principal.name, side = GATE_TARGET, "Toggle requested");
    state.dispatcher.toggle(GATE_TARGET).await.map(Json)
}
