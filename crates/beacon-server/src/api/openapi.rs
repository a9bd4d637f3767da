//! OpenAPI specification for the beacon-presence API.

use axum::Json;
use beacon_core::{
    CandidateData, CapabilityValue, DriverConfig, Observation, PairObject, PairingCandidate,
    PresenceConfig, Transition, Trigger, TriggerCard, TriggerPayload,
};
use utoipa::OpenApi;

use super::devices::{
    DeviceResponse, DevicesResponse, ObservationRequest, ObservationResponse, PairDeviceRequest,
    PropertiesResponse,
};
use super::drivers::{DiscoverResponse, DriversResponse};
use super::error::ErrorResponse;
use super::events::EventsResponse;
use super::health::HealthResponse;
use crate::events::EventEntry;

/// Serve the OpenAPI specification as JSON at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// The OpenAPI specification as pretty JSON, for the gen-openapi binary.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "beacon-presence API",
        version = "0.1.0",
        description = r#"
# beacon-presence API

Pairs Bluetooth Low Energy beacons and reports whether each one is in range.

## Overview

1. **Pairing**: scan for advertisements named after a driver's identifier and pair a candidate
2. **Presence**: a monitor scans periodically; a change counts only after a configurable
   number of consecutive sightings (entering) or misses (leaving)
3. **Events**: every confirmed change fires range and state-change trigger cards

Signal strength, estimated distance and battery level are updated from each sighting.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local beacon-presence server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "pairing", description = "Drivers and discovery of pairing candidates"),
        (name = "devices", description = "Paired beacons, property refresh and observations"),
        (name = "settings", description = "Presence verification thresholds"),
        (name = "events", description = "Trigger cards fired on presence changes")
    ),
    paths(
        super::health::health_check,
        super::drivers::list_drivers,
        super::drivers::discover,
        super::devices::list_devices,
        super::devices::pair_device,
        super::devices::get_device,
        super::devices::remove_device,
        super::devices::refresh_properties,
        super::devices::observe,
        super::settings::get_presence,
        super::settings::update_presence,
        super::events::list_events,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            DriverConfig,
            DriversResponse,
            DiscoverResponse,
            PairingCandidate,
            CandidateData,
            DeviceResponse,
            DevicesResponse,
            PairDeviceRequest,
            PairObject,
            PropertiesResponse,
            ObservationRequest,
            ObservationResponse,
            Observation,
            Transition,
            CapabilityValue,
            PresenceConfig,
            EventsResponse,
            EventEntry,
            Trigger,
            TriggerCard,
            TriggerPayload,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "beacon-presence API");
        assert!(spec.paths.paths.contains_key("/api/drivers/{driver}/discover"));
        assert!(spec.paths.paths.contains_key("/api/devices/{id}/observations"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"beacon-presence API\""));
    }
}
