//! Persistent storage for paired devices.
//!
//! Each device is one JSON file under `<data_dir>/devices/`. [`FileDeviceStore`]
//! writes through on every mutation so a restart resumes with the same
//! settings, capabilities and values.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;

use crate::host::DeviceStore;
use crate::types::{
    CandidateData, CapabilityId, CapabilityValue, EnergyProfile, PairingCandidate,
};

/// Errors raised by device persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A device file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A device file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A device file is not valid JSON for a record.
    #[error("Failed to parse {}: {source}", path.display())]
    ParseError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A record could not be serialized.
    #[error("Failed to serialize device record: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// The storage directory could not be created.
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDirError {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The host refused a write.
    #[error("Write to '{field}' rejected: {message}")]
    Rejected {
        /// Field being written.
        field: String,
        /// Reason given by the host.
        message: String,
    },

    /// The storage location could not be determined.
    #[error("Cannot determine data directory")]
    NoDataDirectory,
}

/// Result type for device persistence.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Setting key holding the device address.
pub const SETTING_ADDRESS: &str = "address";
/// Setting key holding the advertised name.
pub const SETTING_ADVERTISED_NAME: &str = "advertised_name";
/// Setting key holding the user-facing calibrated power.
pub const SETTING_CALIBRATED_POWER: &str = "calibrated_power";
/// Store key holding the calibrated power captured at pairing.
pub const STORE_CALIBRATED_POWER: &str = "calibrated_power_";
/// Store key holding an energy profile waiting to be applied.
pub const STORE_ENERGY: &str = "energy";

/// Persisted shape of a paired device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceRecord {
    /// Device id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Driver that paired the device.
    pub driver: String,

    /// Identifying data from pairing.
    pub data: CandidateData,

    /// Host settings.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub settings: Map<String, Value>,

    /// Host store values.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub store: Map<String, Value>,

    /// Declared capabilities.
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub capabilities: Vec<CapabilityId>,

    /// Current capability values by capability id.
    #[serde(default)]
    pub capability_values: BTreeMap<String, CapabilityValue>,

    /// Energy profile.
    #[serde(default)]
    pub energy: EnergyProfile,
}

impl DeviceRecord {
    /// Build a fresh record from a pairing candidate.
    #[must_use]
    pub fn from_candidate(candidate: &PairingCandidate, driver: &str) -> Self {
        let mut settings = Map::new();
        settings.insert(
            SETTING_ADDRESS.to_string(),
            Value::String(candidate.data.address.clone()),
        );
        settings.insert(
            SETTING_ADVERTISED_NAME.to_string(),
            candidate
                .data
                .name
                .clone()
                .map_or(Value::Null, Value::String),
        );

        Self {
            id: candidate.data.id.clone(),
            name: candidate.name.clone(),
            driver: driver.to_string(),
            data: candidate.data.clone(),
            settings,
            store: Map::new(),
            capabilities: candidate.capabilities.clone(),
            capability_values: BTreeMap::new(),
            energy: EnergyProfile::default(),
        }
    }

    /// The immutable pairing address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.data.address
    }
}

/// In-memory device store.
///
/// Used directly by hosts that persist elsewhere, and as the cache behind
/// [`FileDeviceStore`].
#[derive(Debug)]
pub struct MemoryDeviceStore {
    record: RwLock<DeviceRecord>,
}

impl MemoryDeviceStore {
    /// Wrap a record.
    #[must_use]
    pub const fn new(record: DeviceRecord) -> Self {
        Self {
            record: RwLock::new(record),
        }
    }

    /// Copy of the current record.
    #[must_use]
    pub fn snapshot(&self) -> DeviceRecord {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, DeviceRecord> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DeviceRecord> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    fn capability_value(&self, capability: &CapabilityId) -> Option<CapabilityValue> {
        self.read()
            .capability_values
            .get(capability.as_str())
            .copied()
    }

    async fn set_capability_value(
        &self,
        capability: &CapabilityId,
        value: CapabilityValue,
    ) -> StoreResult<()> {
        self.write()
            .capability_values
            .insert(capability.to_string(), value);
        Ok(())
    }

    fn setting(&self, key: &str) -> Option<Value> {
        self.read().settings.get(key).cloned()
    }

    async fn set_settings(&self, settings: Map<String, Value>) -> StoreResult<()> {
        self.write().settings.extend(settings);
        Ok(())
    }

    fn store_value(&self, key: &str) -> Option<Value> {
        self.read().store.get(key).cloned()
    }

    async fn set_store_value(&self, key: &str, value: Value) -> StoreResult<()> {
        self.write().store.insert(key.to_string(), value);
        Ok(())
    }

    async fn unset_store_value(&self, key: &str) -> StoreResult<()> {
        self.write().store.remove(key);
        Ok(())
    }

    fn energy(&self) -> EnergyProfile {
        self.read().energy.clone()
    }

    async fn set_energy(&self, energy: EnergyProfile) -> StoreResult<()> {
        self.write().energy = energy;
        Ok(())
    }

    fn capabilities(&self) -> Vec<CapabilityId> {
        self.read().capabilities.clone()
    }

    async fn add_capability(&self, capability: &CapabilityId) -> StoreResult<()> {
        let mut record = self.write();
        if !record.capabilities.contains(capability) {
            record.capabilities.push(capability.clone());
        }
        Ok(())
    }

    async fn remove_capability(&self, capability: &CapabilityId) -> StoreResult<()> {
        let mut record = self.write();
        record.capabilities.retain(|c| c != capability);
        record.capability_values.remove(capability.as_str());
        Ok(())
    }
}

/// Storage backend for device records.
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    /// Create a new storage instance.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory to store data files
    pub const fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Get the default storage location.
    ///
    /// On Linux: `/var/lib/beacon-presence/`
    /// Elsewhere: the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory can be determined.
    pub fn default_location() -> StoreResult<Self> {
        default_data_dir().map(Self::new)
    }

    /// Root data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Load every stored device record.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or any record cannot be read.
    pub fn load_devices(&self) -> StoreResult<Vec<DeviceRecord>> {
        let dir = self.devices_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir).map_err(|source| StoreError::ReadError {
            path: dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| StoreError::ReadError {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|source| {
                StoreError::ReadError {
                    path: path.clone(),
                    source,
                }
            })?;
            let record: DeviceRecord = serde_json::from_str(&content)
                .map_err(|source| StoreError::ParseError { path, source })?;
            records.push(record);
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Save a device record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub fn save_device(&self, record: &DeviceRecord) -> StoreResult<()> {
        let dir = self.devices_dir();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDirError {
            path: dir.clone(),
            source,
        })?;
        let path = self.device_path(&record.id);
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, content).map_err(|source| StoreError::WriteError { path, source })
    }

    /// Delete a device record; missing records are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn remove_device(&self, id: &str) -> StoreResult<()> {
        let path = self.device_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::WriteError { path, source }),
        }
    }

    fn devices_dir(&self) -> PathBuf {
        self.data_dir.join("devices")
    }

    fn device_path(&self, id: &str) -> PathBuf {
        self.devices_dir().join(format!("{}.json", file_stem(id)))
    }
}

/// File name for a device id: ASCII alphanumerics and `-` are kept, every
/// other byte becomes `_xx`. Distinct ids never share a file.
fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            let _ = write!(stem, "_{byte:02x}");
        }
    }
    stem
}

/// Default data directory for the current platform.
///
/// # Errors
///
/// Returns an error if no data directory can be determined.
pub fn default_data_dir() -> StoreResult<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/var/lib/beacon-presence"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "beacon-presence")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(StoreError::NoDataDirectory)
    }
}

/// Device store that writes every mutation through to a JSON file.
///
/// Once [`FileDeviceStore::remove`] has run, later mutations only touch the
/// in-memory copy, so handles still held elsewhere cannot bring the file back.
#[derive(Debug)]
pub struct FileDeviceStore {
    cache: MemoryDeviceStore,
    storage: Storage,
    persist_lock: tokio::sync::Mutex<()>,
    removed: AtomicBool,
}

impl FileDeviceStore {
    /// Bind a record to its storage location.
    #[must_use]
    pub fn new(record: DeviceRecord, storage: Storage) -> Self {
        Self {
            cache: MemoryDeviceStore::new(record),
            storage,
            persist_lock: tokio::sync::Mutex::new(()),
            removed: AtomicBool::new(false),
        }
    }

    /// Copy of the current record.
    #[must_use]
    pub fn snapshot(&self) -> DeviceRecord {
        self.cache.snapshot()
    }

    /// Write the current record to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub async fn persist(&self) -> StoreResult<()> {
        let _guard = self.persist_lock.lock().await;
        let record = self.cache.snapshot();
        if self.is_removed() {
            debug!(device = %record.id, "Device removed, not persisting");
            return Ok(());
        }
        debug!(device = %record.id, "Persisting device record");
        self.storage.save_device(&record)
    }

    /// Delete the record file and stop writing it.
    ///
    /// Waits for an in-flight write to finish first.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and cannot be removed; the store
    /// then keeps persisting.
    pub async fn remove(&self) -> StoreResult<()> {
        let _guard = self.persist_lock.lock().await;
        let id = self.cache.snapshot().id;
        self.storage.remove_device(&id)?;
        self.removed.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether [`FileDeviceStore::remove`] has completed.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl DeviceStore for FileDeviceStore {
    fn capability_value(&self, capability: &CapabilityId) -> Option<CapabilityValue> {
        self.cache.capability_value(capability)
    }

    async fn set_capability_value(
        &self,
        capability: &CapabilityId,
        value: CapabilityValue,
    ) -> StoreResult<()> {
        self.cache.set_capability_value(capability, value).await?;
        self.persist().await
    }

    fn setting(&self, key: &str) -> Option<Value> {
        self.cache.setting(key)
    }

    async fn set_settings(&self, settings: Map<String, Value>) -> StoreResult<()> {
        self.cache.set_settings(settings).await?;
        self.persist().await
    }

    fn store_value(&self, key: &str) -> Option<Value> {
        self.cache.store_value(key)
    }

    async fn set_store_value(&self, key: &str, value: Value) -> StoreResult<()> {
        self.cache.set_store_value(key, value).await?;
        self.persist().await
    }

    async fn unset_store_value(&self, key: &str) -> StoreResult<()> {
        self.cache.unset_store_value(key).await?;
        self.persist().await
    }

    fn energy(&self) -> EnergyProfile {
        self.cache.energy()
    }

    async fn set_energy(&self, energy: EnergyProfile) -> StoreResult<()> {
        self.cache.set_energy(energy).await?;
        self.persist().await
    }

    fn capabilities(&self) -> Vec<CapabilityId> {
        self.cache.capabilities()
    }

    async fn add_capability(&self, capability: &CapabilityId) -> StoreResult<()> {
        self.cache.add_capability(capability).await?;
        self.persist().await
    }

    async fn remove_capability(&self, capability: &CapabilityId) -> StoreResult<()> {
        self.cache.remove_capability(capability).await?;
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::candidate;

    #[test]
    fn test_record_from_candidate_seeds_settings() {
        let record =
            DeviceRecord::from_candidate(&candidate("aabbccddeeff", "iBeacon 1"), "ibeacon");
        assert_eq!(record.id, "aabbccddeeff");
        assert_eq!(record.address(), "aabbccddeeff");
        assert_eq!(
            record.settings.get(SETTING_ADDRESS),
            Some(&Value::String("aabbccddeeff".into()))
        );
        assert_eq!(record.capabilities, vec![CapabilityId::DETECT]);
        assert_eq!(record.energy, EnergyProfile::default());
    }

    #[tokio::test]
    async fn test_memory_store_capability_lifecycle() {
        let store = MemoryDeviceStore::new(DeviceRecord::from_candidate(
            &candidate("a1", "iBeacon 1"),
            "ibeacon",
        ));

        store.add_capability(&CapabilityId::SIGNAL_STRENGTH).await.unwrap();
        store.add_capability(&CapabilityId::SIGNAL_STRENGTH).await.unwrap();
        assert_eq!(store.capabilities().len(), 2);

        store
            .set_capability_value(&CapabilityId::SIGNAL_STRENGTH, (-70_i16).into())
            .await
            .unwrap();
        assert_eq!(
            store.capability_value(&CapabilityId::SIGNAL_STRENGTH),
            Some(CapabilityValue::Number(-70.0))
        );

        store.remove_capability(&CapabilityId::SIGNAL_STRENGTH).await.unwrap();
        assert!(!store.has_capability(&CapabilityId::SIGNAL_STRENGTH));
        assert_eq!(store.capability_value(&CapabilityId::SIGNAL_STRENGTH), None);
    }

    #[tokio::test]
    async fn test_file_store_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let record = DeviceRecord::from_candidate(&candidate("aa:bb", "iBeacon 1"), "ibeacon");
        let store = FileDeviceStore::new(record, storage.clone());

        store
            .set_capability_value(&CapabilityId::DETECT, true.into())
            .await
            .unwrap();
        store
            .set_store_value(STORE_CALIBRATED_POWER, serde_json::json!(-59))
            .await
            .unwrap();

        let loaded = storage.load_devices().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], store.snapshot());
        assert_eq!(
            loaded[0].capability_values.get("detect"),
            Some(&CapabilityValue::Boolean(true))
        );
    }

    #[tokio::test]
    async fn test_file_store_stops_writing_after_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let record =
            DeviceRecord::from_candidate(&candidate("aabbccddeeff", "iBeacon 1"), "ibeacon");
        let store = FileDeviceStore::new(record, storage.clone());
        store.persist().await.unwrap();

        store.remove().await.unwrap();
        store
            .set_capability_value(&CapabilityId::DETECT, true.into())
            .await
            .unwrap();

        assert!(store.is_removed());
        assert!(storage.load_devices().unwrap().is_empty());
        assert_eq!(
            store.capability_value(&CapabilityId::DETECT),
            Some(CapabilityValue::Boolean(true))
        );
    }

    #[test]
    fn test_similar_ids_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        for id in ["aa:bb", "aa_bb", "aa-bb"] {
            let record = DeviceRecord::from_candidate(&candidate(id, id), "ibeacon");
            storage.save_device(&record).unwrap();
        }

        let ids: Vec<String> = storage
            .load_devices()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"aa:bb".to_string()));
        assert!(ids.contains(&"aa_bb".to_string()));
        assert_eq!(file_stem("aa:bb"), "aa_3abb");
        assert_eq!(file_stem("aa_bb"), "aa_5fbb");
    }

    #[test]
    fn test_remove_missing_device_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        assert!(storage.remove_device("nope").is_ok());
    }

    #[test]
    fn test_load_from_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("missing"));
        assert!(storage.load_devices().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_record_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("devices")).unwrap();
        std::fs::write(dir.path().join("devices").join("bad.json"), "{not json").unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        assert!(matches!(
            storage.load_devices(),
            Err(StoreError::ParseError { .. })
        ));
    }
}
