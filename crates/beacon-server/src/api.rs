//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `drivers` - Beacon drivers and pairing discovery
//! - `devices` - Paired devices, property refresh and observations
//! - `settings` - Presence thresholds
//! - `events` - Recent trigger cards
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod devices;
pub mod drivers;
pub mod error;
pub mod events;
pub mod health;
pub mod openapi;
pub mod settings;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                          - Health check
/// /api
/// ├── /drivers                     - Configured drivers
/// │   └── /{driver}/discover       - Pairing discovery
/// ├── /devices                     - Paired devices (list, pair)
/// │   └── /{id}                    - One device (get, remove)
/// │       ├── /properties          - Reconcile with fresh pairing data
/// │       └── /observations        - Manual seen / not-seen observation
/// ├── /settings/presence           - Verification thresholds
/// ├── /events                      - Recent trigger cards
/// └── /openapi.json                - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/openapi.json", get(openapi::get_openapi_spec))
        .merge(drivers::router())
        .merge(devices::router())
        .merge(settings::router())
        .merge(events::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use beacon_core::{
        Advertisement, BeaconConfig, DriverConfig, MockScanner, Observation, PresenceConfig,
        Storage, Transition,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use super::*;
    use crate::api::devices::{DeviceResponse, DevicesResponse, ObservationResponse};
    use crate::api::drivers::DiscoverResponse;
    use crate::api::events::EventsResponse;
    use crate::state::AppState;

    const ADDRESS: &str = "c3a1f00b2e11";

    struct Harness {
        server: TestServer,
        scanner: Arc<MockScanner>,
        _dir: TempDir,
    }

    fn harness(presence: PresenceConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let scanner = Arc::new(MockScanner::new());
        let mut config = BeaconConfig {
            drivers: vec![DriverConfig::ibeacon()],
            ..BeaconConfig::default()
        };
        config.presence = presence;
        config.discovery.retry_delay_ms = 0;

        let state = AppState::new(
            config,
            None,
            scanner.clone(),
            Storage::new(dir.path().to_path_buf()),
        )
        .unwrap()
        .shared();

        Harness {
            server: TestServer::new(create_router(state)).unwrap(),
            scanner,
            _dir: dir,
        }
    }

    fn ibeacon(uuid: &str) -> Advertisement {
        Advertisement {
            local_name: Some("iBeacon".to_string()),
            id: uuid.to_string(),
            uuid: uuid.to_string(),
            name: Some("iBeacon".to_string()),
            address_type: "random".to_string(),
            rssi: -61,
            calibrated_power: Some(-59),
            battery_level: None,
        }
    }

    async fn pair(h: &Harness) -> DeviceResponse {
        h.scanner.set_visible(vec![ibeacon(ADDRESS)]);
        let discovered: DiscoverResponse = h
            .server
            .post("/api/drivers/ibeacon/discover")
            .await
            .json();
        let response = h
            .server
            .post("/api/devices")
            .json(&json!({ "driver": "ibeacon", "candidate": discovered.candidates[0] }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(PresenceConfig::default());
        let response = h.server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["paired_devices"], 0);
        assert_eq!(body["in_range"], 0);
    }

    #[tokio::test]
    async fn test_discover_returns_named_candidates() {
        let h = harness(PresenceConfig::default());
        h.scanner.set_visible(vec![
            ibeacon(ADDRESS),
            Advertisement {
                local_name: Some("Other".to_string()),
                ..ibeacon("aabbccddeeff")
            },
        ]);

        let response = h.server.post("/api/drivers/ibeacon/discover").await;

        response.assert_status_ok();
        let body: DiscoverResponse = response.json();
        assert_eq!(body.candidates.len(), 1);
        assert_eq!(body.candidates[0].name, "iBeacon 1");
        assert_eq!(body.candidates[0].data.address, ADDRESS);
    }

    #[tokio::test]
    async fn test_discover_nothing_after_retry_is_404() {
        let h = harness(PresenceConfig::default());

        let response = h.server.post("/api/drivers/ibeacon/discover").await;

        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"], "no_devices_found");
        assert_eq!(h.scanner.scan_count(), 2);
    }

    #[tokio::test]
    async fn test_discover_unknown_driver() {
        let h = harness(PresenceConfig::default());
        h.server
            .post("/api/drivers/eddystone/discover")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        assert_eq!(h.scanner.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_pair_list_and_remove() {
        let h = harness(PresenceConfig::default());
        let device = pair(&h).await;
        assert_eq!(device.id, ADDRESS);
        assert!(!device.detected);

        let listed: DevicesResponse = h.server.get("/api/devices").await.json();
        assert_eq!(listed.devices.len(), 1);

        h.server
            .post("/api/devices")
            .json(&json!({
                "driver": "ibeacon",
                "candidate": {
                    "name": "iBeacon 1",
                    "data": {
                        "id": ADDRESS, "uuid": ADDRESS, "address": ADDRESS,
                        "name": "iBeacon", "type": "random", "version": "v0.1.0"
                    },
                    "capabilities": ["detect"]
                }
            }))
            .await
            .assert_status(StatusCode::CONFLICT);

        h.server
            .delete(&format!("/api/devices/{ADDRESS}"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        h.server
            .get(&format!("/api/devices/{ADDRESS}"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pair_rejects_malformed_address() {
        let h = harness(PresenceConfig::default());
        h.server
            .post("/api/devices")
            .json(&json!({
                "driver": "ibeacon",
                "candidate": {
                    "name": "iBeacon 1",
                    "data": {
                        "id": "x", "uuid": "x", "address": "not-an-address",
                        "name": "iBeacon", "type": "random", "version": "v0.1.0"
                    },
                    "capabilities": ["detect"]
                }
            }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_observations_debounce_and_fire_events() {
        let h = harness(PresenceConfig {
            verification_amount_inside: 2,
            verification_amount_outside: 2,
        });
        pair(&h).await;
        let path = format!("/api/devices/{ADDRESS}/observations");

        let first: ObservationResponse = h
            .server
            .post(&path)
            .json(&json!({ "seen": true }))
            .await
            .json();
        assert!(matches!(
            first.observation,
            Observation::Pending {
                count: 1,
                required: 2
            }
        ));
        assert!(!first.detected);

        let second: ObservationResponse = h
            .server
            .post(&path)
            .json(&json!({ "seen": true }))
            .await
            .json();
        assert_eq!(
            second.observation,
            Observation::Confirmed {
                transition: Transition::Entered
            }
        );
        assert!(second.detected);
        assert_eq!(second.pending_count, 0);

        let events: EventsResponse = h.server.get("/api/events").await.json();
        assert_eq!(events.events.len(), 4);

        let health: Value = h.server.get("/health").await.json();
        assert_eq!(health["paired_devices"], 1);
        assert_eq!(health["in_range"], 1);
    }

    #[tokio::test]
    async fn test_refresh_properties_reports_change() {
        let h = harness(PresenceConfig::default());
        pair(&h).await;
        let path = format!("/api/devices/{ADDRESS}/properties");
        let pair_object = json!({
            "settings": {
                "address": ADDRESS,
                "advertised_name": "iBeacon",
                "calibrated_power": null
            },
            "store": {},
            "capabilities": ["detect", "signal_strength", "homey_distance"]
        });

        let first: Value = h.server.put(&path).json(&pair_object).await.json();
        assert_eq!(first["changed"], true);

        let again: Value = h.server.put(&path).json(&pair_object).await.json();
        assert_eq!(again["changed"], false);

        let device: DeviceResponse = h
            .server
            .get(&format!("/api/devices/{ADDRESS}"))
            .await
            .json();
        assert_eq!(device.capabilities.len(), 3);
    }

    #[tokio::test]
    async fn test_presence_settings_roundtrip_and_validation() {
        let h = harness(PresenceConfig::default());

        let current: PresenceConfig = h.server.get("/api/settings/presence").await.json();
        assert_eq!(current, PresenceConfig::default());

        h.server
            .put("/api/settings/presence")
            .json(&json!({ "verification_amount_inside": 3, "verification_amount_outside": 4 }))
            .await
            .assert_status_ok();
        let updated: PresenceConfig = h.server.get("/api/settings/presence").await.json();
        assert_eq!(updated.verification_amount_inside, 3);

        h.server
            .put("/api/settings/presence")
            .json(&json!({ "verification_amount_inside": 0, "verification_amount_outside": 4 }))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_openapi_served() {
        let h = harness(PresenceConfig::default());
        let spec: Value = h.server.get("/api/openapi.json").await.json();
        assert_eq!(spec["info"]["title"], "beacon-presence API");
    }
}
