//! Application configuration management.
//!
//! Handles loading, saving, and validating configuration including:
//! - Presence verification thresholds
//! - Discovery retry timing
//! - Monitor scan interval
//! - Beacon drivers offered for pairing
//! - Server bind address and data directory
//!
//! Values come from an optional TOML file, then from `BEACON__<SECTION>__<KEY>`
//! environment variables.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::host::SettingsReader;
use crate::matcher::DeviceMatcher;
use crate::presence::Thresholds;
use crate::storage::{default_data_dir, StoreResult};

static DRIVER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("valid regex"));

static MAC_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}([:-]?[0-9A-Fa-f]{2}){5}$").expect("valid regex")
});

static PERIPHERAL_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{8}-?[0-9A-Fa-f]{4}-?[0-9A-Fa-f]{4}-?[0-9A-Fa-f]{4}-?[0-9A-Fa-f]{12}$")
        .expect("valid regex")
});

/// Errors raised while loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] ::config::ConfigError),

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field is invalid.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),

    /// No configuration directory exists on this platform.
    #[error("Cannot determine config directory")]
    NoConfigDirectory,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BeaconConfig {
    /// Presence verification thresholds.
    pub presence: PresenceConfig,

    /// Pairing discovery.
    pub discovery: DiscoveryConfig,

    /// Runtime scan loop.
    pub monitor: MonitorConfig,

    /// HTTP server.
    pub server: ServerConfig,

    /// Device storage.
    pub storage: StorageConfig,

    /// Beacon drivers offered for pairing.
    pub drivers: Vec<DriverConfig>,
}

/// Presence verification thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PresenceConfig {
    /// Consecutive sightings needed before a beacon counts as inside range.
    #[schema(example = 1, minimum = 1)]
    pub verification_amount_inside: u32,

    /// Consecutive misses needed before a beacon counts as outside range.
    #[schema(example = 5, minimum = 1)]
    pub verification_amount_outside: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            verification_amount_inside: 1,
            verification_amount_outside: 5,
        }
    }
}

impl PresenceConfig {
    /// Thresholds for the debouncer.
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        Thresholds::new(
            self.verification_amount_inside,
            self.verification_amount_outside,
        )
    }

    fn validate(&self, errors: &mut Vec<ConfigError>) {
        if self.verification_amount_inside == 0 {
            errors.push(invalid(
                "presence.verification_amount_inside",
                "must be at least 1",
            ));
        }
        if self.verification_amount_outside == 0 {
            errors.push(invalid(
                "presence.verification_amount_outside",
                "must be at least 1",
            ));
        }
    }
}

/// Pairing discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Delay before the single retry when the first scan finds nothing.
    pub retry_delay_ms: u64,

    /// How long one scan listens for advertisements.
    pub scan_duration_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 1000,
            scan_duration_secs: 5,
        }
    }
}

impl DiscoveryConfig {
    /// Retry delay as a duration.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Scan duration as a duration.
    #[must_use]
    pub const fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }
}

/// Runtime scan loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between observation cycles.
    pub scan_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 10,
        }
    }
}

impl MonitorConfig {
    /// Scan interval as a duration.
    #[must_use]
    pub const fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for device records; platform default when unset.
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured data directory, or the platform default.
    ///
    /// # Errors
    ///
    /// Returns an error if no default data directory exists.
    pub fn resolve_data_dir(&self) -> StoreResult<PathBuf> {
        self.data_dir.clone().map_or_else(default_data_dir, Ok)
    }
}

/// A beacon family offered for pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DriverConfig {
    /// Driver id used in API paths.
    #[schema(example = "ibeacon")]
    pub id: String,

    /// Name used for pairing candidates.
    #[schema(example = "iBeacon")]
    pub display_name: String,

    /// Broadcast name that identifies this family.
    #[schema(example = "iBeacon")]
    pub identifier: String,
}

impl DriverConfig {
    /// The built-in iBeacon driver.
    #[must_use]
    pub fn ibeacon() -> Self {
        Self {
            id: "ibeacon".to_string(),
            display_name: "iBeacon".to_string(),
            identifier: "iBeacon".to_string(),
        }
    }

    /// Matcher for this driver.
    #[must_use]
    pub fn matcher(&self) -> DeviceMatcher {
        DeviceMatcher::new(&self.identifier, &self.display_name)
    }
}

impl BeaconConfig {
    /// Load configuration; the file must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or invalid.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::build(path)
    }

    /// Load configuration, falling back to defaults for a missing file.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file or the environment is invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::build(path.as_ref())
    }

    fn build(path: &Path) -> ConfigResult<Self> {
        let sources = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix("BEACON")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = sources.try_deserialize()?;
        if config.drivers.is_empty() {
            config.drivers.push(DriverConfig::ibeacon());
        }
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        self.validate()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every section; all problems are reported together.
    ///
    /// # Errors
    ///
    /// Returns the single error, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        self.presence.validate(&mut errors);

        if self.discovery.retry_delay_ms > 60_000 {
            errors.push(invalid(
                "discovery.retry_delay_ms",
                "must not exceed 60000",
            ));
        }
        if self.discovery.scan_duration_secs == 0 {
            errors.push(invalid("discovery.scan_duration_secs", "must be at least 1"));
        }
        if self.monitor.scan_interval_secs == 0 {
            errors.push(invalid("monitor.scan_interval_secs", "must be at least 1"));
        }
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(invalid(
                "server.bind_address",
                format!("'{}' is not a socket address", self.server.bind_address),
            ));
        }

        let mut seen_ids: Vec<&str> = Vec::new();
        for driver in &self.drivers {
            if !DRIVER_ID.is_match(&driver.id) {
                errors.push(invalid(
                    "drivers.id",
                    format!("'{}' must be lowercase letters, digits, '-' or '_'", driver.id),
                ));
            }
            if seen_ids.contains(&driver.id.as_str()) {
                errors.push(invalid("drivers.id", format!("duplicate driver '{}'", driver.id)));
            }
            seen_ids.push(&driver.id);
            if driver.identifier.is_empty() {
                errors.push(invalid(
                    "drivers.identifier",
                    format!("driver '{}' has an empty identifier", driver.id),
                ));
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Look up a driver by id.
    #[must_use]
    pub fn driver(&self, id: &str) -> Option<&DriverConfig> {
        self.drivers.iter().find(|d| d.id == id)
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Default configuration file location.
///
/// # Errors
///
/// Returns an error if no configuration directory exists on this platform.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/etc/beacon-presence/config.toml"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let dirs = directories::ProjectDirs::from("", "", "beacon-presence")
            .ok_or(ConfigError::NoConfigDirectory)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Whether `address` looks like a BLE peripheral address (MAC or platform UUID).
#[must_use]
pub fn is_valid_device_address(address: &str) -> bool {
    MAC_ADDRESS.is_match(address) || PERIPHERAL_UUID.is_match(address)
}

/// Live presence settings shared between the host and every device.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    presence: Arc<RwLock<PresenceConfig>>,
}

impl SharedSettings {
    /// Start from the given thresholds.
    #[must_use]
    pub fn new(presence: PresenceConfig) -> Self {
        Self {
            presence: Arc::new(RwLock::new(presence)),
        }
    }

    /// Current presence settings.
    #[must_use]
    pub fn presence(&self) -> PresenceConfig {
        *self.presence.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the presence settings after validating them.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a threshold is zero.
    pub fn update(&self, presence: PresenceConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();
        presence.validate(&mut errors);
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
        *self.presence.write().unwrap_or_else(PoisonError::into_inner) = presence;
        Ok(())
    }
}

impl SettingsReader for SharedSettings {
    fn thresholds(&self) -> Thresholds {
        self.presence().thresholds()
    }
}
