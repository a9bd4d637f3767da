//! Collaborator interfaces supplied by the host platform.
//!
//! The core never reaches a global: every device receives a store, a trigger
//! sink and a settings reader, and discovery receives a scanner.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::BeaconResult;
use crate::notify::Trigger;
use crate::presence::Thresholds;
use crate::storage::StoreResult;
use crate::types::{Advertisement, CapabilityId, CapabilityValue, EnergyProfile};

/// Produces batches of currently visible advertisements.
#[async_trait]
pub trait AdvertisementScanner: Send + Sync {
    /// Scan once and return everything seen.
    async fn scan_advertisements(&self) -> BeaconResult<Vec<Advertisement>>;
}

/// Read access to the host settings the debouncer depends on.
pub trait SettingsReader: Send + Sync {
    /// Current verification thresholds.
    fn thresholds(&self) -> Thresholds;
}

/// Per-device persistence.
///
/// Reads come from the host's cached copy and are infallible; writes are
/// asynchronous and may fail independently of one another.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Current value of a capability slot.
    fn capability_value(&self, capability: &CapabilityId) -> Option<CapabilityValue>;

    /// Write a capability slot.
    async fn set_capability_value(
        &self,
        capability: &CapabilityId,
        value: CapabilityValue,
    ) -> StoreResult<()>;

    /// A single setting; `None` when unset.
    fn setting(&self, key: &str) -> Option<Value>;

    /// Merge settings into the device.
    async fn set_settings(&self, settings: Map<String, Value>) -> StoreResult<()>;

    /// A single store value; `None` when unset.
    fn store_value(&self, key: &str) -> Option<Value>;

    /// Write a store value.
    async fn set_store_value(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Remove a store value.
    async fn unset_store_value(&self, key: &str) -> StoreResult<()>;

    /// Current energy profile.
    fn energy(&self) -> EnergyProfile;

    /// Replace the energy profile.
    async fn set_energy(&self, energy: EnergyProfile) -> StoreResult<()>;

    /// Declared capabilities, in registration order.
    fn capabilities(&self) -> Vec<CapabilityId>;

    /// Whether a capability is declared.
    fn has_capability(&self, capability: &CapabilityId) -> bool {
        self.capabilities().contains(capability)
    }

    /// Declare a capability.
    async fn add_capability(&self, capability: &CapabilityId) -> StoreResult<()>;

    /// Withdraw a capability.
    async fn remove_capability(&self, capability: &CapabilityId) -> StoreResult<()>;
}

/// Delivers trigger cards to whatever listens for them.
#[async_trait]
pub trait TriggerSink: Send + Sync {
    /// Deliver a single trigger.
    async fn trigger(&self, trigger: &Trigger) -> BeaconResult<()>;
}
