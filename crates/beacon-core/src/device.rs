//! Paired beacon devices.
//!
//! A [`BeaconDevice`] binds one paired beacon to the collaborators it needs:
//! its store, the trigger sink and the settings reader. Observations for the
//! same device are serialized; different devices never share state.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::distance::checked_distance;
use crate::error::BeaconError;
use crate::host::{DeviceStore, SettingsReader, TriggerSink};
use crate::notify::{fan_out, Trigger};
use crate::presence::{Observation, PresenceDebouncer};
use crate::reconcile::DeviceReconciler;
use crate::storage::{
    DeviceRecord, StoreResult, SETTING_CALIBRATED_POWER, STORE_CALIBRATED_POWER, STORE_ENERGY,
};
use crate::types::{Advertisement, CapabilityId, CapabilityValue, EnergyProfile, PairObject};

/// Collaborators injected into every device.
#[derive(Clone)]
pub struct DeviceContext {
    /// Persistence for this device.
    pub store: Arc<dyn DeviceStore>,
    /// Where trigger cards go.
    pub triggers: Arc<dyn TriggerSink>,
    /// Source of the verification thresholds.
    pub settings: Arc<dyn SettingsReader>,
}

/// A paired beacon.
pub struct BeaconDevice {
    id: String,
    name: String,
    address: String,
    presence: Mutex<PresenceDebouncer>,
    ctx: DeviceContext,
}

impl BeaconDevice {
    /// Bind a device to its collaborators.
    ///
    /// The confirmed presence starts from the stored `detect` value, or absent.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        ctx: DeviceContext,
    ) -> Self {
        let detected = ctx
            .store
            .capability_value(&CapabilityId::DETECT)
            .and_then(CapabilityValue::as_bool)
            .unwrap_or(false);
        let name = name.into();
        info!(device = %name, detected, "Beacon device is initiated");

        Self {
            id: id.into(),
            name,
            address: address.into(),
            presence: Mutex::new(PresenceDebouncer::new(detected)),
            ctx,
        }
    }

    /// Bind a stored record.
    #[must_use]
    pub fn from_record(record: &DeviceRecord, ctx: DeviceContext) -> Self {
        Self::new(&record.id, &record.name, record.address(), ctx)
    }

    /// Device id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pairing address, matched against advertisement uuids.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The device store.
    #[must_use]
    pub fn store(&self) -> &dyn DeviceStore {
        self.ctx.store.as_ref()
    }

    /// Confirmed presence and the pending counter.
    pub async fn presence(&self) -> (bool, u32) {
        let presence = self.presence.lock().await;
        (presence.detected(), presence.change_detected())
    }

    /// Feed one observation cycle.
    ///
    /// On a confirmed change the `detect` capability is written before any
    /// trigger is fired; neither a failed write nor failed triggers roll the
    /// state back.
    pub async fn observe(&self, seen: bool) -> Observation {
        let thresholds = self.ctx.settings.thresholds();

        let observation = {
            let mut presence = self.presence.lock().await;
            let observation = presence.observe(seen, thresholds);

            match observation {
                Observation::Pending { count, required } => {
                    let direction = if seen { "inside" } else { "outside" };
                    debug!(device = %self.name, direction, count, required, "Changed detect");
                }
                Observation::Confirmed { transition } => {
                    info!(device = %self.name, ?transition, "Presence confirmed");
                    let result = self
                        .ctx
                        .store
                        .set_capability_value(&CapabilityId::DETECT, transition.detected().into())
                        .await;
                    self.log_write(CapabilityId::DETECT.as_str(), result);
                }
                Observation::Reaffirmed => {}
            }

            observation
        };

        if let Observation::Confirmed { transition } = observation {
            let triggers = Trigger::for_transition(&self.id, &self.name, transition);
            let report = fan_out(self.ctx.triggers.as_ref(), &triggers).await;
            if report.failed > 0 {
                warn!(
                    device = %self.name,
                    delivered = report.delivered,
                    failed = report.failed,
                    "Some trigger cards were not delivered"
                );
            }
        }

        observation
    }

    /// Record a sighting.
    pub async fn set_detect(&self) -> Observation {
        self.observe(true).await
    }

    /// Record a miss.
    pub async fn set_undetect(&self) -> Observation {
        self.observe(false).await
    }

    /// Push signal strength, distance and battery readings from a sample.
    ///
    /// Also applies an energy profile left in the `energy` store value by the
    /// pairing flow, then clears it.
    pub async fn update_capability_values(&self, sample: &Advertisement) {
        let store = self.store();

        if store.has_capability(&CapabilityId::SIGNAL_STRENGTH) {
            let rssi = CapabilityValue::from(sample.rssi);
            if store.capability_value(&CapabilityId::SIGNAL_STRENGTH) != Some(rssi) {
                let result = store
                    .set_capability_value(&CapabilityId::SIGNAL_STRENGTH, rssi)
                    .await;
                self.log_write(CapabilityId::SIGNAL_STRENGTH.as_str(), result);
            }
        }

        if store.has_capability(&CapabilityId::DISTANCE) {
            match checked_distance(self.calibrated_power(sample), sample.rssi) {
                Some(distance) => {
                    debug!(device = %self.name, distance, "Set distance");
                    let distance = CapabilityValue::from(distance);
                    if store.capability_value(&CapabilityId::DISTANCE) != Some(distance) {
                        let result = store
                            .set_capability_value(&CapabilityId::DISTANCE, distance)
                            .await;
                        self.log_write(CapabilityId::DISTANCE.as_str(), result);
                    }
                }
                None => debug!(device = %self.name, "No calibrated power, skipping distance"),
            }
        }

        if let Some(level) = sample.battery_level {
            if store.has_capability(&CapabilityId::MEASURE_BATTERY) {
                let result = store
                    .set_capability_value(&CapabilityId::MEASURE_BATTERY, level.into())
                    .await;
                self.log_write(CapabilityId::MEASURE_BATTERY.as_str(), result);
            }
        }

        if let Some(energy) = store.store_value(STORE_ENERGY).filter(|v| !v.is_null()) {
            let result = store.unset_store_value(STORE_ENERGY).await;
            self.log_write(STORE_ENERGY, result);
            let result = store.set_energy(EnergyProfile(energy)).await;
            self.log_write("energy", result);
        }
    }

    /// Merge fresh pairing data into this device; returns whether anything changed.
    pub async fn refresh_properties(&self, pair: &PairObject) -> bool {
        let changed = DeviceReconciler.reconcile(self.store(), pair).await;
        if changed {
            info!(device = %self.name, "Properties refreshed");
        }
        changed
    }

    /// Calibration for distance: the sample, then the setting, then the pairing store value.
    fn calibrated_power(&self, sample: &Advertisement) -> Option<i16> {
        let as_power = |v: Value| v.as_i64().and_then(|p| i16::try_from(p).ok());
        sample
            .calibrated_power
            .or_else(|| self.store().setting(SETTING_CALIBRATED_POWER).and_then(as_power))
            .or_else(|| self.store().store_value(STORE_CALIBRATED_POWER).and_then(as_power))
    }

    fn log_write(&self, field: &str, result: StoreResult<()>) {
        if let Err(e) = result {
            let err = BeaconError::PropertySync {
                field: field.to_string(),
                message: e.to_string(),
            };
            error!(device = %self.name, error = %err, "Property write failed");
        }
    }
}

impl std::fmt::Debug for BeaconDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconDevice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
