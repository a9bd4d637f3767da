//! Unified error types for the beacon core library.
//!
//! [`BeaconError`] covers every failure mode the core surfaces to a host.
//! Modules keep their own narrower errors ([`ConfigError`](crate::config::ConfigError),
//! [`StoreError`](crate::storage::StoreError)) and convert into it.
//!
//! Not every error is fatal. Property sync and notification errors are logged
//! where they occur and never abort the operation that produced them; they
//! appear here so the logs and the host share one vocabulary.
//!
//! # Example
//!
//! ```rust
//! use beacon_core::error::{BeaconError, BeaconResult};
//!
//! fn require_candidates(found: usize, identifier: &str) -> BeaconResult<()> {
//!     if found == 0 {
//!         return Err(BeaconError::NoDevicesFound {
//!             identifier: identifier.to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all beacon operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    // =========================================================================
    // BLUETOOTH & DISCOVERY ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    BluetoothAdapterNotFound,

    /// The scanner failed to produce a batch of advertisements.
    #[error("Cannot discover BLE devices: {0}")]
    BluetoothScanFailed(String),

    /// Discovery found no advertisement matching the driver identifier, even after retrying.
    #[error("No devices found advertising '{identifier}'.")]
    NoDevicesFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// No advertisement in the batch carries the device address.
    #[error("Cannot find advertisement with uuid {0}")]
    DeviceNotFound(String),

    /// More than one advertisement in the batch carries the device address.
    #[error("Found {count} advertisements with uuid {address}")]
    AmbiguousAdvertisement {
        /// The device address.
        address: String,
        /// How many advertisements matched.
        count: usize,
    },

    /// The requested driver is not configured.
    #[error("Unknown driver: '{0}'")]
    UnknownDriver(String),

    // =========================================================================
    // CONNECTION ERRORS
    // =========================================================================
    /// Connecting to or disconnecting from a peripheral failed.
    #[error("Failed connection to peripheral {address}: {message}")]
    ConnectionFailed {
        /// Peripheral address.
        address: String,
        /// Underlying failure.
        message: String,
    },

    // =========================================================================
    // DEVICE ERRORS
    // =========================================================================
    /// A single persisted field could not be written.
    #[error("Cannot sync property '{field}': {message}")]
    PropertySync {
        /// The field being written.
        field: String,
        /// Underlying failure.
        message: String,
    },

    /// A trigger card could not be delivered.
    #[error("Cannot trigger flow card {card}: {message}")]
    NotificationFailed {
        /// The trigger card id.
        card: String,
        /// Underlying failure.
        message: String,
    },

    /// A device with this id is already paired.
    #[error("Device '{0}' is already paired")]
    DeviceAlreadyPaired(String),

    /// No paired device has this id.
    #[error("Unknown device: '{0}'")]
    UnknownDevice(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beacon operations.
pub type BeaconResult<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Returns `true` if this error is reported to the pairing flow as a discovery failure.
    #[inline]
    #[must_use]
    pub const fn is_discovery_error(&self) -> bool {
        matches!(
            self,
            Self::NoDevicesFound { .. } | Self::BluetoothScanFailed(_) | Self::UnknownDriver(_)
        )
    }

    /// Returns `true` if this error is related to Bluetooth operations.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(
            self,
            Self::BluetoothAdapterNotFound
                | Self::BluetoothScanFailed(_)
                | Self::NoDevicesFound { .. }
                | Self::DeviceNotFound(_)
                | Self::AmbiguousAdvertisement { .. }
                | Self::ConnectionFailed { .. }
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(
            self,
            Self::PersistenceError(_) | Self::IoError(_) | Self::PropertySync { .. }
        )
    }

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoDevicesFound { .. }
                | Self::DeviceNotFound(_)
                | Self::BluetoothScanFailed(_)
                | Self::NotificationFailed { .. }
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 404 Not Found
            Self::NoDevicesFound { .. }
            | Self::DeviceNotFound(_)
            | Self::UnknownDriver(_)
            | Self::UnknownDevice(_)
            | Self::ConfigNotFound(_) => 404,

            // 409 Conflict
            Self::DeviceAlreadyPaired(_) | Self::AmbiguousAdvertisement { .. } => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::IoError(_) | Self::PropertySync { .. } => 500,

            // 502 Bad Gateway - a downstream collaborator failed
            Self::ConnectionFailed { .. } | Self::NotificationFailed { .. } => 502,

            // 503 Service Unavailable - Bluetooth hardware issues
            Self::BluetoothAdapterNotFound | Self::BluetoothScanFailed(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BluetoothAdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::BluetoothScanFailed(_) => "BLUETOOTH_SCAN_FAILED",
            Self::NoDevicesFound { .. } => "NO_DEVICES_FOUND",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::AmbiguousAdvertisement { .. } => "AMBIGUOUS_ADVERTISEMENT",
            Self::UnknownDriver(_) => "UNKNOWN_DRIVER",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::PropertySync { .. } => "PROPERTY_SYNC_FAILED",
            Self::NotificationFailed { .. } => "NOTIFICATION_FAILED",
            Self::DeviceAlreadyPaired(_) => "DEVICE_ALREADY_PAIRED",
            Self::UnknownDevice(_) => "UNKNOWN_DEVICE",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for BeaconError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
            ConfigError::NoConfigDirectory => {
                Self::PersistenceError("Cannot determine config directory".into())
            }
        }
    }
}

impl From<crate::storage::StoreError> for BeaconError {
    fn from(err: crate::storage::StoreError) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_discovery_error_classification() {
        assert!(BeaconError::NoDevicesFound {
            identifier: "iBeacon".into()
        }
        .is_discovery_error());
        assert!(BeaconError::BluetoothScanFailed("adapter busy".into()).is_discovery_error());

        assert!(!BeaconError::DeviceNotFound("aabb".into()).is_discovery_error());
    }

    #[test]
    fn test_bluetooth_error_classification() {
        assert!(BeaconError::BluetoothAdapterNotFound.is_bluetooth_error());
        assert!(BeaconError::ConnectionFailed {
            address: "aabb".into(),
            message: "timeout".into()
        }
        .is_bluetooth_error());

        assert!(!BeaconError::PersistenceError("disk full".into()).is_bluetooth_error());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(BeaconError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(BeaconError::ConfigParseError("syntax error".into()).is_config_error());
        assert!(BeaconError::ConfigValidationError("invalid value".into()).is_config_error());

        assert!(!BeaconError::BluetoothAdapterNotFound.is_config_error());
    }

    #[test]
    fn test_io_error_classification() {
        assert!(BeaconError::PersistenceError("disk full".into()).is_io_error());
        assert!(BeaconError::IoError(IoErr::new(ErrorKind::NotFound, "test")).is_io_error());
        assert!(BeaconError::PropertySync {
            field: "address".into(),
            message: "rejected".into()
        }
        .is_io_error());

        assert!(!BeaconError::BluetoothAdapterNotFound.is_io_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(BeaconError::DeviceNotFound("aabb".into()).is_recoverable());
        assert!(BeaconError::BluetoothScanFailed("timeout".into()).is_recoverable());
        assert!(!BeaconError::BluetoothAdapterNotFound.is_recoverable());
        assert!(!BeaconError::UnknownDriver("eddystone".into()).is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(
            BeaconError::NoDevicesFound {
                identifier: "iBeacon".into()
            }
            .http_status_code(),
            404
        );
        assert_eq!(
            BeaconError::DeviceAlreadyPaired("aabb".into()).http_status_code(),
            409
        );
        assert_eq!(
            BeaconError::ConfigValidationError("error".into()).http_status_code(),
            422
        );
        assert_eq!(
            BeaconError::PersistenceError("error".into()).http_status_code(),
            500
        );
        assert_eq!(
            BeaconError::BluetoothAdapterNotFound.http_status_code(),
            503
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BeaconError::BluetoothAdapterNotFound.error_code(),
            "BLUETOOTH_ADAPTER_NOT_FOUND"
        );
        assert_eq!(
            BeaconError::NoDevicesFound {
                identifier: "iBeacon".into()
            }
            .error_code(),
            "NO_DEVICES_FOUND"
        );
        assert_eq!(
            BeaconError::UnknownDevice("x".into()).error_code(),
            "UNKNOWN_DEVICE"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoErr::new(ErrorKind::NotFound, "file not found");
        let beacon_err: BeaconError = io_err.into();
        assert!(matches!(beacon_err, BeaconError::IoError(_)));
        assert!(beacon_err.is_io_error());
    }

    #[test]
    fn test_error_display_messages() {
        let err = BeaconError::NoDevicesFound {
            identifier: "iBeacon".into(),
        };
        assert!(err.to_string().contains("iBeacon"));

        let err = BeaconError::DeviceNotFound("aabbccddeeff".into());
        assert!(err.to_string().contains("aabbccddeeff"));

        let err = BeaconError::NotificationFailed {
            card: "beacon_inside_range".into(),
            message: "no listeners".into(),
        };
        assert!(err.to_string().contains("beacon_inside_range"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BeaconError>();
        assert_sync::<BeaconError>();
    }
}
