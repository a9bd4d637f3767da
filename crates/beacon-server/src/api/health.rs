//! `GET /health`: liveness plus a count of beacons currently in range.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Liveness report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "paired_devices": 2,
    "in_range": 1
}))]
pub struct HealthResponse {
    /// Always `ok` when the server answers.
    pub status: String,

    /// Server version.
    pub version: String,

    /// Paired beacons.
    pub paired_devices: usize,

    /// Paired beacons whose confirmed state is detected.
    pub in_range: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Liveness and presence summary",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let state = state.read().await;
    let mut paired_devices = 0;
    let mut in_range = 0;
    for paired in state.paired() {
        paired_devices += 1;
        if paired.device.presence().await.0 {
            in_range += 1;
        }
    }

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        paired_devices,
        in_range,
    })
}
