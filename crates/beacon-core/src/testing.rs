//! Test doubles shared by the unit tests.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{BeaconError, BeaconResult};
use crate::host::{DeviceStore, SettingsReader, TriggerSink};
use crate::notify::{Trigger, TriggerCard};
use crate::presence::Thresholds;
use crate::storage::{DeviceRecord, MemoryDeviceStore, StoreError, StoreResult};
use crate::types::{
    Advertisement, CandidateData, CapabilityId, CapabilityValue, EnergyProfile, PairObject,
    PairSettings, PairStore, PairingCandidate,
};

pub fn advertisement(local_name: Option<&str>, uuid: &str, rssi: i16) -> Advertisement {
    Advertisement {
        local_name: local_name.map(str::to_string),
        id: uuid.to_string(),
        uuid: uuid.to_string(),
        name: local_name.map(str::to_string),
        address_type: "random".to_string(),
        rssi,
        calibrated_power: None,
        battery_level: None,
    }
}

pub fn candidate(address: &str, name: &str) -> PairingCandidate {
    PairingCandidate {
        name: name.to_string(),
        data: CandidateData {
            id: address.to_string(),
            uuid: address.to_string(),
            address: address.to_string(),
            name: Some("iBeacon".to_string()),
            address_type: "random".to_string(),
            version: "v0.1.0".to_string(),
        },
        capabilities: vec![CapabilityId::DETECT],
    }
}

pub fn pair_object(address: &str, capabilities: &[&str]) -> PairObject {
    PairObject {
        settings: PairSettings {
            address: address.to_string(),
            advertised_name: Some("iBeacon".to_string()),
            calibrated_power: None,
        },
        store: PairStore::default(),
        capabilities: capabilities.iter().map(|c| CapabilityId::new(*c)).collect(),
    }
}

pub struct FixedSettings(pub Thresholds);

impl SettingsReader for FixedSettings {
    fn thresholds(&self) -> Thresholds {
        self.0
    }
}

/// Store that logs every attempted write as `"<op>:<key>"` and can reject chosen ones.
pub struct RecordingStore {
    inner: MemoryDeviceStore,
    writes: Mutex<Vec<String>>,
    failing: Vec<String>,
}

impl RecordingStore {
    pub fn new(record: DeviceRecord) -> Self {
        Self {
            inner: MemoryDeviceStore::new(record),
            writes: Mutex::new(Vec::new()),
            failing: Vec::new(),
        }
    }

    pub fn failing_on(mut self, writes: &[&str]) -> Self {
        self.failing = writes.iter().map(|w| (*w).to_string()).collect();
        self
    }

    pub const fn inner(&self) -> &MemoryDeviceStore {
        &self.inner
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, op: &str, key: &str) -> StoreResult<()> {
        let entry = format!("{op}:{key}");
        let rejected = self.failing.contains(&entry);
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        if rejected {
            return Err(StoreError::Rejected {
                field: key.to_string(),
                message: "rejected by test".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for RecordingStore {
    fn capability_value(&self, capability: &CapabilityId) -> Option<CapabilityValue> {
        self.inner.capability_value(capability)
    }

    async fn set_capability_value(
        &self,
        capability: &CapabilityId,
        value: CapabilityValue,
    ) -> StoreResult<()> {
        self.record("set_capability_value", capability.as_str())?;
        self.inner.set_capability_value(capability, value).await
    }

    fn setting(&self, key: &str) -> Option<Value> {
        self.inner.setting(key)
    }

    async fn set_settings(&self, settings: Map<String, Value>) -> StoreResult<()> {
        let keys: Vec<&str> = settings.keys().map(String::as_str).collect();
        self.record("set_settings", &keys.join(","))?;
        self.inner.set_settings(settings).await
    }

    fn store_value(&self, key: &str) -> Option<Value> {
        self.inner.store_value(key)
    }

    async fn set_store_value(&self, key: &str, value: Value) -> StoreResult<()> {
        self.record("set_store_value", key)?;
        self.inner.set_store_value(key, value).await
    }

    async fn unset_store_value(&self, key: &str) -> StoreResult<()> {
        self.record("unset_store_value", key)?;
        self.inner.unset_store_value(key).await
    }

    fn energy(&self) -> EnergyProfile {
        self.inner.energy()
    }

    async fn set_energy(&self, energy: EnergyProfile) -> StoreResult<()> {
        self.record("set_energy", "energy")?;
        self.inner.set_energy(energy).await
    }

    fn capabilities(&self) -> Vec<CapabilityId> {
        self.inner.capabilities()
    }

    async fn add_capability(&self, capability: &CapabilityId) -> StoreResult<()> {
        self.record("add_capability", capability.as_str())?;
        self.inner.add_capability(capability).await
    }

    async fn remove_capability(&self, capability: &CapabilityId) -> StoreResult<()> {
        self.record("remove_capability", capability.as_str())?;
        self.inner.remove_capability(capability).await
    }
}

/// Trigger sink that records attempts and rejects chosen cards.
#[derive(Default)]
pub struct RecordingSink {
    failing: Vec<TriggerCard>,
    attempted: Mutex<Vec<Trigger>>,
    delivered: Mutex<Vec<Trigger>>,
}

impl RecordingSink {
    pub fn failing_on(cards: &[TriggerCard]) -> Self {
        Self {
            failing: cards.to_vec(),
            ..Self::default()
        }
    }

    pub fn attempted(&self) -> Vec<Trigger> {
        self.attempted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn delivered(&self) -> Vec<Trigger> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TriggerSink for RecordingSink {
    async fn trigger(&self, trigger: &Trigger) -> BeaconResult<()> {
        self.attempted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(trigger.clone());
        if self.failing.contains(&trigger.card) {
            return Err(BeaconError::NotificationFailed {
                card: trigger.card.id().to_string(),
                message: "no listener".to_string(),
            });
        }
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(trigger.clone());
        Ok(())
    }
}
