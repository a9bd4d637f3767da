//! Driver listing and pairing discovery endpoints.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_core::{discover_devices, BeaconError, DriverConfig, PairingCandidate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the drivers router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/drivers", get(list_drivers))
        .route("/api/drivers/{driver}/discover", post(discover))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Configured drivers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DriversResponse {
    /// Every driver that can pair beacons.
    pub drivers: Vec<DriverConfig>,
}

/// Pairing candidates found by a discovery scan.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "driver": "ibeacon",
    "candidates": [
        {
            "name": "iBeacon 1",
            "data": {
                "id": "c3a1f00b2e11",
                "uuid": "c3a1f00b2e11",
                "address": "c3a1f00b2e11",
                "name": "iBeacon",
                "type": "random",
                "version": "v0.1.0"
            },
            "capabilities": ["detect"]
        }
    ]
}))]
pub struct DiscoverResponse {
    /// Driver the scan matched against.
    #[schema(example = "ibeacon")]
    pub driver: String,

    /// Candidates in the order they were seen.
    pub candidates: Vec<PairingCandidate>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List configured drivers.
#[utoipa::path(
    get,
    path = "/api/drivers",
    tag = "pairing",
    operation_id = "listDrivers",
    summary = "List beacon drivers",
    description = "Returns every configured beacon family with the broadcast \
        name used to recognize it during pairing.",
    responses(
        (status = 200, description = "Drivers listed", body = DriversResponse)
    )
)]
pub async fn list_drivers(State(state): State<SharedState>) -> Json<DriversResponse> {
    Json(DriversResponse {
        drivers: state.read().await.config.drivers.clone(),
    })
}

/// Scan for pairing candidates of one driver.
#[utoipa::path(
    post,
    path = "/api/drivers/{driver}/discover",
    tag = "pairing",
    operation_id = "discoverDevices",
    summary = "Discover pairing candidates",
    description = "Scans for advertisements whose local name equals the driver's \
        identifier. An empty first scan is retried once after the configured delay.",
    params(
        ("driver" = String, Path, description = "Driver id", example = "ibeacon")
    ),
    responses(
        (status = 200, description = "Candidates found", body = DiscoverResponse),
        (status = 404, description = "Unknown driver, or nothing found after the retry", body = ErrorResponse),
        (status = 503, description = "Bluetooth unavailable", body = ErrorResponse)
    )
)]
pub async fn discover(
    State(state): State<SharedState>,
    Path(driver): Path<String>,
) -> ApiResult<Json<DiscoverResponse>> {
    // Scans take seconds; the state lock is released first.
    let (scanner, matcher, retry_delay) = {
        let state_guard = state.read().await;
        let config = state_guard
            .config
            .driver(&driver)
            .ok_or_else(|| BeaconError::UnknownDriver(driver.clone()))?;
        (
            state_guard.scanner.clone(),
            config.matcher(),
            state_guard.config.discovery.retry_delay(),
        )
    };

    let candidates = discover_devices(scanner.as_ref(), &matcher, retry_delay).await?;

    Ok(Json(DiscoverResponse { driver, candidates }))
}
