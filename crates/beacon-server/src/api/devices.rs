//! Paired device endpoints.
//!
//! Pairing, removal, property refresh and manual observations for hosts
//! that feed sightings from elsewhere.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use beacon_core::{
    is_valid_device_address, CapabilityValue, Observation, PairObject, PairingCandidate,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::{PairedDevice, SharedState};

/// Creates the devices router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/devices", get(list_devices).post(pair_device))
        .route("/api/devices/{id}", get(get_device).delete(remove_device))
        .route("/api/devices/{id}/properties", put(refresh_properties))
        .route("/api/devices/{id}/observations", post(observe))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A paired device and its current presence.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "c3a1f00b2e11",
    "name": "iBeacon 1",
    "driver": "ibeacon",
    "address": "c3a1f00b2e11",
    "detected": true,
    "pending_count": 0,
    "capabilities": ["detect", "signal_strength"],
    "capability_values": { "detect": true, "signal_strength": -61.0 },
    "settings": { "address": "c3a1f00b2e11", "advertised_name": "iBeacon" }
}))]
pub struct DeviceResponse {
    /// Device id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Driver that paired it.
    pub driver: String,

    /// Pairing address.
    pub address: String,

    /// Confirmed presence.
    pub detected: bool,

    /// Consecutive observations disagreeing with `detected`.
    pub pending_count: u32,

    /// Declared capabilities.
    pub capabilities: Vec<String>,

    /// Current capability values.
    pub capability_values: BTreeMap<String, CapabilityValue>,

    /// Device settings.
    #[schema(value_type = Object)]
    pub settings: Map<String, Value>,
}

impl DeviceResponse {
    async fn describe(paired: &PairedDevice) -> Self {
        let record = paired.store.snapshot();
        let (detected, pending_count) = paired.device.presence().await;
        Self {
            address: record.address().to_string(),
            id: record.id,
            name: record.name,
            driver: record.driver,
            detected,
            pending_count,
            capabilities: record.capabilities.iter().map(ToString::to_string).collect(),
            capability_values: record.capability_values,
            settings: record.settings,
        }
    }
}

/// Paired devices.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DevicesResponse {
    /// Every paired device, ordered by id.
    pub devices: Vec<DeviceResponse>,
}

/// Request body for pairing a discovered candidate.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PairDeviceRequest {
    /// Driver the candidate was discovered with.
    #[schema(example = "ibeacon")]
    pub driver: String,

    /// The candidate as returned by discovery.
    pub candidate: PairingCandidate,
}

/// Result of a property refresh.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PropertiesResponse {
    /// Whether any setting, store value, energy profile or capability changed.
    #[schema(example = true)]
    pub changed: bool,
}

/// Request body for a manual observation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ObservationRequest {
    /// Whether the beacon was seen in this cycle.
    #[schema(example = true)]
    pub seen: bool,
}

/// Outcome of a manual observation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ObservationResponse {
    /// What the debouncer made of the observation.
    pub observation: Observation,

    /// Confirmed presence afterwards.
    pub detected: bool,

    /// Pending counter afterwards.
    pub pending_count: u32,
}

// ============================================================================
// Handlers
// ============================================================================

/// List paired devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    operation_id = "listDevices",
    summary = "List paired devices",
    description = "Returns every paired beacon with its confirmed presence and \
        latest capability values.",
    responses(
        (status = 200, description = "Devices listed", body = DevicesResponse)
    )
)]
pub async fn list_devices(State(state): State<SharedState>) -> Json<DevicesResponse> {
    let paired: Vec<PairedDevice> = state.read().await.paired().cloned().collect();

    let mut devices = Vec::with_capacity(paired.len());
    for device in &paired {
        devices.push(DeviceResponse::describe(device).await);
    }
    Json(DevicesResponse { devices })
}

/// Pair a discovered candidate.
#[utoipa::path(
    post,
    path = "/api/devices",
    tag = "devices",
    operation_id = "pairDevice",
    summary = "Pair a device",
    description = "Stores a candidate returned by discovery as a paired device. \
        The device starts out absent and is picked up by the next monitor cycle.",
    request_body = PairDeviceRequest,
    responses(
        (status = 201, description = "Device paired", body = DeviceResponse),
        (status = 400, description = "Invalid device address", body = ErrorResponse),
        (status = 404, description = "Unknown driver", body = ErrorResponse),
        (status = 409, description = "Device already paired", body = ErrorResponse)
    )
)]
pub async fn pair_device(
    State(state): State<SharedState>,
    Json(request): Json<PairDeviceRequest>,
) -> ApiResult<(StatusCode, Json<DeviceResponse>)> {
    if !is_valid_device_address(&request.candidate.data.address) {
        return Err(ApiError::BadRequest {
            error_code: "invalid_device_address".to_string(),
            message: format!(
                "'{}' is not a Bluetooth address or peripheral UUID",
                request.candidate.data.address
            ),
        });
    }

    let paired = state
        .write()
        .await
        .pair(&request.driver, &request.candidate)?;

    Ok((StatusCode::CREATED, Json(DeviceResponse::describe(&paired).await)))
}

/// Get one paired device.
#[utoipa::path(
    get,
    path = "/api/devices/{id}",
    tag = "devices",
    operation_id = "getDevice",
    summary = "Get a paired device",
    params(
        ("id" = String, Path, description = "Device id")
    ),
    responses(
        (status = 200, description = "Device found", body = DeviceResponse),
        (status = 404, description = "Unknown device", body = ErrorResponse)
    )
)]
pub async fn get_device(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeviceResponse>> {
    let paired = state.read().await.device(&id)?.clone();
    Ok(Json(DeviceResponse::describe(&paired).await))
}

/// Remove a paired device.
#[utoipa::path(
    delete,
    path = "/api/devices/{id}",
    tag = "devices",
    operation_id = "removeDevice",
    summary = "Remove a paired device",
    params(
        ("id" = String, Path, description = "Device id")
    ),
    responses(
        (status = 204, description = "Device removed"),
        (status = 404, description = "Unknown device", body = ErrorResponse)
    )
)]
pub async fn remove_device(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.write().await.unpair(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reconcile a paired device with fresh pairing data.
#[utoipa::path(
    put,
    path = "/api/devices/{id}/properties",
    tag = "devices",
    operation_id = "refreshProperties",
    summary = "Refresh device properties",
    description = "Compares the given pairing object with the stored device and \
        writes only what differs: address, advertised name, calibrated power, \
        energy profile and the capability set. Individual write failures are \
        logged and do not stop the remaining writes.",
    params(
        ("id" = String, Path, description = "Device id")
    ),
    request_body = PairObject,
    responses(
        (status = 200, description = "Reconciliation done", body = PropertiesResponse),
        (status = 404, description = "Unknown device", body = ErrorResponse)
    )
)]
pub async fn refresh_properties(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(pair): Json<PairObject>,
) -> ApiResult<Json<PropertiesResponse>> {
    let device = state.read().await.device(&id)?.device.clone();
    let changed = device.refresh_properties(&pair).await;
    Ok(Json(PropertiesResponse { changed }))
}

/// Feed one observation to a device.
#[utoipa::path(
    post,
    path = "/api/devices/{id}/observations",
    tag = "devices",
    operation_id = "observeDevice",
    summary = "Record an observation",
    description = "Feeds one seen/not-seen observation through the presence \
        debouncer, exactly as a monitor cycle would. A confirmed change fires \
        the range and state-change trigger cards.",
    params(
        ("id" = String, Path, description = "Device id")
    ),
    request_body = ObservationRequest,
    responses(
        (status = 200, description = "Observation applied", body = ObservationResponse),
        (status = 404, description = "Unknown device", body = ErrorResponse)
    )
)]
pub async fn observe(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ObservationRequest>,
) -> ApiResult<Json<ObservationResponse>> {
    let device = state.read().await.device(&id)?.device.clone();

    let observation = device.observe(request.seen).await;
    let (detected, pending_count) = device.presence().await;

    Ok(Json(ObservationResponse {
        observation,
        detected,
        pending_count,
    }))
}
