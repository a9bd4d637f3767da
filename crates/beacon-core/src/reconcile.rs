//! Merging pairing data into a persisted device.
//!
//! Every tracked field is compared against the incoming payload and written
//! only when it differs, so an unchanged refresh costs no writes and wakes no
//! listeners. Writes are isolated: one failing field is logged and the rest
//! proceed.

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::BeaconError;
use crate::host::DeviceStore;
use crate::storage::{
    StoreResult, SETTING_ADDRESS, SETTING_ADVERTISED_NAME, SETTING_CALIBRATED_POWER,
    STORE_CALIBRATED_POWER,
};
use crate::types::{CapabilityId, PairObject};

/// Capabilities to withdraw and declare to move from one set to another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityDiff {
    /// In the new set but not the current one.
    pub added: Vec<CapabilityId>,
    /// In the current set but not the new one.
    pub removed: Vec<CapabilityId>,
}

impl CapabilityDiff {
    /// Compare two capability sets by id; positions and duplicates do not matter.
    #[must_use]
    pub fn between(current: &[CapabilityId], next: &[CapabilityId]) -> Self {
        Self {
            added: difference(next, current),
            removed: difference(current, next),
        }
    }

    /// Whether the sets are equal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

fn difference(from: &[CapabilityId], without: &[CapabilityId]) -> Vec<CapabilityId> {
    let mut out: Vec<CapabilityId> = Vec::new();
    for id in from {
        if !without.contains(id) && !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

/// Applies pairing payloads to device stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceReconciler;

impl DeviceReconciler {
    /// Merge `pair` into `store`.
    ///
    /// Returns whether any field or the capability set differed. The flag
    /// reflects intended changes; individual write failures are logged and do
    /// not affect it.
    pub async fn reconcile(&self, store: &dyn DeviceStore, pair: &PairObject) -> bool {
        let mut changed = false;

        let address = Value::String(pair.settings.address.clone());
        changed |= sync_setting(store, SETTING_ADDRESS, address).await;

        let advertised_name = pair
            .settings
            .advertised_name
            .clone()
            .map_or(Value::Null, Value::String);
        changed |= sync_setting(store, SETTING_ADVERTISED_NAME, advertised_name).await;

        let stored_power = pair.store.calibrated_power.map_or(Value::Null, Value::from);
        if store.store_value(STORE_CALIBRATED_POWER).unwrap_or(Value::Null) != stored_power {
            log_failure(
                STORE_CALIBRATED_POWER,
                store.set_store_value(STORE_CALIBRATED_POWER, stored_power).await,
            );
            changed = true;
        }

        let calibrated_power = pair.settings.calibrated_power.map_or(Value::Null, Value::from);
        changed |= sync_setting(store, SETTING_CALIBRATED_POWER, calibrated_power).await;

        let energy = pair.store.energy.clone().unwrap_or_default();
        if store.energy() != energy {
            log_failure("energy", store.set_energy(energy).await);
            changed = true;
        }

        let diff = CapabilityDiff::between(&store.capabilities(), &pair.capabilities);
        if !diff.is_empty() {
            debug!(added = ?diff.added, removed = ?diff.removed, "Reconciling capabilities");
            for capability in &diff.removed {
                log_failure(capability.as_str(), store.remove_capability(capability).await);
            }
            for capability in &diff.added {
                log_failure(capability.as_str(), store.add_capability(capability).await);
            }
            changed = true;
        }

        changed
    }
}

async fn sync_setting(store: &dyn DeviceStore, key: &str, value: Value) -> bool {
    if store.setting(key).unwrap_or(Value::Null) == value {
        return false;
    }

    let mut settings = Map::new();
    settings.insert(key.to_string(), value);
    log_failure(key, store.set_settings(settings).await);
    true
}

fn log_failure(field: &str, result: StoreResult<()>) {
    if let Err(e) = result {
        let err = BeaconError::PropertySync {
            field: field.to_string(),
            message: e.to_string(),
        };
        error!(error = %err, "Property write failed");
    }
}
