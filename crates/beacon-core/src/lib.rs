//! # beacon-core
//!
//! Core logic for debounced BLE beacon presence detection.
//!
//! This crate provides:
//! - Presence debouncing (consecutive sightings and misses before a change counts)
//! - Matching advertisements to drivers during pairing and to paired devices at runtime
//! - Reconciliation of paired device properties with fresh pairing data
//! - Distance estimation from signal strength and calibrated power
//! - Trigger card fan-out on confirmed changes
//! - Persistent device records and configuration
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`presence`] - The enter/leave debouncer
//! - [`matcher`] - Advertisement matching for pairing and runtime lookup
//! - [`discovery`] - Pairing-time scan with a single retry
//! - [`reconcile`] - Property and capability reconciliation
//! - [`distance`] - Path-loss distance estimate
//! - [`device`] - A paired beacon bound to its collaborators
//! - [`monitor`] - The scan-and-observe loop
//! - [`notify`] - Trigger cards and concurrent fan-out
//! - [`bluetooth`] - BlueZ and scripted advertisement scanners
//! - [`ibeacon`] - Apple iBeacon frame decoding
//! - [`host`] - Collaborator traits supplied by the host
//! - [`storage`] - Device stores and JSON device records
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod bluetooth;
pub mod config;
pub mod device;
pub mod discovery;
pub mod distance;
pub mod error;
pub mod host;
pub mod ibeacon;
pub mod matcher;
pub mod monitor;
pub mod notify;
pub mod presence;
pub mod reconcile;
pub mod storage;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::BluezScanner;
#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use bluetooth::MockScanner;
pub use config::{
    default_config_path, is_valid_device_address, BeaconConfig, ConfigError, ConfigResult,
    DriverConfig, PresenceConfig, SharedSettings,
};
pub use device::{BeaconDevice, DeviceContext};
pub use discovery::{discover_devices, DEFAULT_RETRY_DELAY};
pub use distance::estimate_distance;
pub use error::{BeaconError, BeaconResult};
pub use host::{AdvertisementScanner, DeviceStore, SettingsReader, TriggerSink};
pub use matcher::DeviceMatcher;
pub use monitor::{DeviceOutcome, Monitor, Sighting};
pub use notify::{fan_out, FanOutReport, Trigger, TriggerCard, TriggerPayload};
pub use presence::{Observation, PresenceDebouncer, Thresholds, Transition};
pub use reconcile::{CapabilityDiff, DeviceReconciler};
pub use storage::{default_data_dir, DeviceRecord, FileDeviceStore, MemoryDeviceStore, Storage};
pub use types::{
    Advertisement, CandidateData, CapabilityId, CapabilityValue, PairObject, PairingCandidate,
};
