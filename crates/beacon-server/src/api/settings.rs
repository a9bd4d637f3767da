//! Presence settings endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use beacon_core::PresenceConfig;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the settings router.
pub fn router() -> Router<SharedState> {
    Router::new().route(
        "/api/settings/presence",
        get(get_presence).put(update_presence),
    )
}

/// Get presence thresholds.
#[utoipa::path(
    get,
    path = "/api/settings/presence",
    tag = "settings",
    operation_id = "getPresenceSettings",
    summary = "Get presence thresholds",
    description = "Returns how many consecutive sightings confirm that a beacon \
        entered range and how many consecutive misses confirm that it left.",
    responses(
        (status = 200, description = "Current thresholds", body = PresenceConfig)
    )
)]
pub async fn get_presence(State(state): State<SharedState>) -> Json<PresenceConfig> {
    Json(state.read().await.settings.presence())
}

/// Update presence thresholds.
#[utoipa::path(
    put,
    path = "/api/settings/presence",
    tag = "settings",
    operation_id = "updatePresenceSettings",
    summary = "Update presence thresholds",
    description = "Replaces both thresholds. Devices use the new values from \
        their next observation; pending counters are kept.",
    request_body = PresenceConfig,
    responses(
        (status = 200, description = "Thresholds updated", body = PresenceConfig),
        (status = 422, description = "A threshold is zero", body = ErrorResponse)
    )
)]
pub async fn update_presence(
    State(state): State<SharedState>,
    Json(presence): Json<PresenceConfig>,
) -> ApiResult<Json<PresenceConfig>> {
    state.write().await.update_presence(presence)?;
    Ok(Json(presence))
}
