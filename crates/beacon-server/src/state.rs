//! Application state shared across handlers and the monitor loop.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use beacon_core::{
    AdvertisementScanner, BeaconConfig, BeaconDevice, BeaconError, BeaconResult, DeviceContext,
    DeviceRecord, FileDeviceStore, PairingCandidate, PresenceConfig, SharedSettings, Storage,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::events::EventLog;

/// State handle passed to every handler.
pub type SharedState = Arc<RwLock<AppState>>;

/// A paired device with its write-through store.
#[derive(Debug, Clone)]
pub struct PairedDevice {
    /// Runtime device.
    pub device: Arc<BeaconDevice>,
    /// Its persisted record.
    pub store: Arc<FileDeviceStore>,
}

/// Application state.
pub struct AppState {
    /// Loaded configuration.
    pub config: BeaconConfig,

    /// Where presence settings are saved back to, if anywhere.
    pub config_path: Option<PathBuf>,

    /// Live presence thresholds read by every device.
    pub settings: SharedSettings,

    /// Device record storage.
    pub storage: Storage,

    /// Advertisement source for discovery and monitoring.
    pub scanner: Arc<dyn AdvertisementScanner>,

    /// Fired triggers.
    pub events: Arc<EventLog>,

    devices: BTreeMap<String, PairedDevice>,
}

impl AppState {
    /// Build state and bind every stored device.
    ///
    /// # Errors
    ///
    /// Returns an error if stored device records cannot be read.
    pub fn new(
        config: BeaconConfig,
        config_path: Option<PathBuf>,
        scanner: Arc<dyn AdvertisementScanner>,
        storage: Storage,
    ) -> BeaconResult<Self> {
        let records = storage.load_devices()?;
        let mut state = Self {
            settings: SharedSettings::new(config.presence),
            config,
            config_path,
            storage,
            scanner,
            events: Arc::new(EventLog::default()),
            devices: BTreeMap::new(),
        };
        for record in records {
            state.bind(record);
        }
        info!(devices = state.devices.len(), "Loaded paired devices");
        Ok(state)
    }

    /// Wrap into the handle handlers share.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    fn bind(&mut self, record: DeviceRecord) -> PairedDevice {
        let store = Arc::new(FileDeviceStore::new(record.clone(), self.storage.clone()));
        let ctx = DeviceContext {
            store: store.clone(),
            triggers: self.events.clone(),
            settings: Arc::new(self.settings.clone()),
        };
        let paired = PairedDevice {
            device: Arc::new(BeaconDevice::from_record(&record, ctx)),
            store,
        };
        self.devices.insert(record.id, paired.clone());
        paired
    }

    /// Pair a discovered candidate under `driver`.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is unknown, the device is already
    /// paired, or its record cannot be written.
    pub fn pair(
        &mut self,
        driver: &str,
        candidate: &PairingCandidate,
    ) -> BeaconResult<PairedDevice> {
        if self.config.driver(driver).is_none() {
            return Err(BeaconError::UnknownDriver(driver.to_string()));
        }
        if self.devices.contains_key(&candidate.data.id) {
            return Err(BeaconError::DeviceAlreadyPaired(candidate.data.id.clone()));
        }

        let record = DeviceRecord::from_candidate(candidate, driver);
        self.storage.save_device(&record)?;
        info!(device = %record.name, address = %record.address(), driver, "Device paired");
        Ok(self.bind(record))
    }

    /// Forget a paired device and delete its record.
    ///
    /// Handles to the device that are still in use keep working in memory,
    /// but no longer write to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is unknown or its record cannot be removed.
    pub async fn unpair(&mut self, id: &str) -> BeaconResult<()> {
        let paired = self.device(id)?.clone();
        paired.store.remove().await?;
        self.devices.remove(id);
        info!(device = %paired.device.name(), "Device removed");
        Ok(())
    }

    /// Look up a paired device.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::UnknownDevice`] if nothing is paired under `id`.
    pub fn device(&self, id: &str) -> BeaconResult<&PairedDevice> {
        self.devices
            .get(id)
            .ok_or_else(|| BeaconError::UnknownDevice(id.to_string()))
    }

    /// Every paired device, ordered by id.
    pub fn paired(&self) -> impl Iterator<Item = &PairedDevice> {
        self.devices.values()
    }

    /// Runtime devices for one monitor cycle.
    #[must_use]
    pub fn device_list(&self) -> Vec<Arc<BeaconDevice>> {
        self.devices.values().map(|p| p.device.clone()).collect()
    }

    /// Apply new presence thresholds and save them if a config file is in use.
    ///
    /// # Errors
    ///
    /// Returns a validation error for zero thresholds, or a write error.
    pub fn update_presence(&mut self, presence: PresenceConfig) -> BeaconResult<()> {
        let mut next = self.config.clone();
        next.presence = presence;
        if let Some(path) = &self.config_path {
            next.save(path)?;
        }
        self.settings.update(presence)?;
        self.config = next;
        info!(
            inside = presence.verification_amount_inside,
            outside = presence.verification_amount_outside,
            "Presence settings updated"
        );
        Ok(())
    }
}

/// Scanner for this host: BlueZ when available, otherwise one that sees nothing.
pub async fn default_scanner(config: &BeaconConfig) -> Arc<dyn AdvertisementScanner> {
    #[cfg(feature = "bluetooth")]
    {
        match beacon_core::BluezScanner::new(config.discovery.scan_duration()).await {
            Ok(scanner) => return Arc::new(scanner),
            Err(e) => warn!(error = %e, "Bluetooth unavailable, using an empty scanner"),
        }
    }
    #[cfg(not(feature = "bluetooth"))]
    {
        let _ = config;
        warn!("Built without Bluetooth support, using an empty scanner");
    }
    Arc::new(beacon_core::MockScanner::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{CandidateData, CapabilityId, DriverConfig, MockScanner};

    fn candidate(address: &str) -> PairingCandidate {
        PairingCandidate {
            name: "iBeacon 1".to_string(),
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

    fn state(dir: &std::path::Path) -> AppState {
        let config = BeaconConfig {
            drivers: vec![DriverConfig::ibeacon()],
            ..BeaconConfig::default()
        };
        AppState::new(
            config,
            None,
            Arc::new(MockScanner::new()),
            Storage::new(dir.to_path_buf()),
        )
        .unwrap()
    }

    #[test]
    fn test_pair_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = state(dir.path());
        first.pair("ibeacon", &candidate("aabbccddeeff")).unwrap();

        let reloaded = state(dir.path());

        assert_eq!(reloaded.device_list().len(), 1);
        assert_eq!(
            reloaded.device("aabbccddeeff").unwrap().device.address(),
            "aabbccddeeff"
        );
    }

    #[test]
    fn test_pair_rejects_duplicates_and_unknown_driver() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(dir.path());
        state.pair("ibeacon", &candidate("aabbccddeeff")).unwrap();

        assert!(matches!(
            state.pair("ibeacon", &candidate("aabbccddeeff")),
            Err(BeaconError::DeviceAlreadyPaired(_))
        ));
        assert!(matches!(
            state.pair("eddystone", &candidate("112233445566")),
            Err(BeaconError::UnknownDriver(_))
        ));
    }

    #[tokio::test]
    async fn test_unpair_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(dir.path());
        state.pair("ibeacon", &candidate("aabbccddeeff")).unwrap();

        state.unpair("aabbccddeeff").await.unwrap();

        assert!(state.device("aabbccddeeff").is_err());
        assert!(Storage::new(dir.path().to_path_buf())
            .load_devices()
            .unwrap()
            .is_empty());
        assert!(matches!(
            state.unpair("aabbccddeeff").await,
            Err(BeaconError::UnknownDevice(_))
        ));
    }

    #[tokio::test]
    async fn test_unpaired_device_stays_gone_when_a_held_handle_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = state(dir.path());
        app.pair("ibeacon", &candidate("aabbccddeeff")).unwrap();
        let held = app.device_list();

        app.unpair("aabbccddeeff").await.unwrap();
        held[0].observe(true).await;

        assert!(held[0].presence().await.0);
        let restarted = state(dir.path());
        assert!(restarted.device_list().is_empty());
    }

    #[test]
    fn test_update_presence_saves_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut state = state(dir.path());
        state.config_path = Some(path.clone());

        let presence = PresenceConfig {
            verification_amount_inside: 2,
            verification_amount_outside: 3,
        };
        state.update_presence(presence).unwrap();

        assert_eq!(BeaconConfig::load(&path).unwrap().presence, presence);
        assert_eq!(state.settings.presence(), presence);
    }
}
