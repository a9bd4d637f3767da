//! Bluetooth Low Energy advertisement scanning.
//!
//! This module provides:
//! - [`BluezScanner`], which listens for advertisements through BlueZ
//! - [`MockScanner`], a scripted scanner for tests and radio-less hosts
//!
//! Both implement [`AdvertisementScanner`].

use async_trait::async_trait;

use crate::error::BeaconResult;
use crate::host::AdvertisementScanner;

#[cfg(feature = "bluetooth")]
pub use bluez::BluezScanner;

#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth"), test))]
pub use mock::MockScanner;

/// Identifier used for a peripheral: its address, lowercase, without separators.
#[must_use]
pub fn peripheral_uuid(address: &str) -> String {
    address
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(feature = "bluetooth")]
mod bluez {
    use std::str::FromStr;
    use std::time::Duration;

    use bluer::{Adapter, AdapterEvent, Address, Session};
    use futures::{pin_mut, StreamExt};
    use tokio::sync::Mutex;
    use tokio::time::Instant;
    use tracing::{debug, info, warn};

    use super::{async_trait, peripheral_uuid, AdvertisementScanner, BeaconResult};
    use crate::error::BeaconError;
    use crate::ibeacon::IBeaconFrame;
    use crate::types::Advertisement;

    /// Scanner backed by the system BlueZ daemon.
    pub struct BluezScanner {
        _session: Session,
        adapter: Adapter,
        scan_duration: Duration,
        scan_lock: Mutex<()>,
    }

    impl BluezScanner {
        /// Open the default adapter and power it on.
        ///
        /// # Errors
        ///
        /// Returns [`BeaconError::BluetoothAdapterNotFound`] if BlueZ or the
        /// adapter is unavailable.
        pub async fn new(scan_duration: Duration) -> BeaconResult<Self> {
            let session = Session::new().await.map_err(|e| {
                warn!(error = %e, "Failed to open BlueZ session");
                BeaconError::BluetoothAdapterNotFound
            })?;
            let adapter = session.default_adapter().await.map_err(|e| {
                warn!(error = %e, "No default Bluetooth adapter");
                BeaconError::BluetoothAdapterNotFound
            })?;
            adapter.set_powered(true).await.map_err(scan_failed)?;

            info!(adapter = adapter.name(), "Bluetooth adapter ready");

            Ok(Self {
                _session: session,
                adapter,
                scan_duration,
                scan_lock: Mutex::new(()),
            })
        }

        /// Listen for advertisements for the configured scan duration.
        ///
        /// Scans are serialized; a second caller waits for the running scan.
        ///
        /// # Errors
        ///
        /// Returns [`BeaconError::BluetoothScanFailed`] if discovery cannot start.
        pub async fn scan(&self) -> BeaconResult<Vec<Advertisement>> {
            let _guard = self.scan_lock.lock().await;

            let mut addresses: Vec<Address> = Vec::new();
            {
                let events = self.adapter.discover_devices().await.map_err(scan_failed)?;
                pin_mut!(events);
                let deadline = Instant::now() + self.scan_duration;

                while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.next()).await {
                    if let AdapterEvent::DeviceAdded(address) = event {
                        if !addresses.contains(&address) {
                            addresses.push(address);
                        }
                    }
                }
            }

            let mut advertisements = Vec::with_capacity(addresses.len());
            for address in addresses {
                match self.read_advertisement(address).await {
                    Ok(Some(advertisement)) => advertisements.push(advertisement),
                    Ok(None) => {}
                    Err(e) => debug!(%address, error = %e, "Skipping unreadable peripheral"),
                }
            }

            debug!(count = advertisements.len(), "Scan finished");
            Ok(advertisements)
        }

        async fn read_advertisement(
            &self,
            address: Address,
        ) -> bluer::Result<Option<Advertisement>> {
            let device = self.adapter.device(address)?;

            // Cached peripherals without a current RSSI are not advertising.
            let Some(rssi) = device.rssi().await? else {
                return Ok(None);
            };

            let name = device.name().await?;
            let address_type = device.address_type().await?.to_string();
            let tx_power = device.tx_power().await?;
            let ibeacon = device
                .manufacturer_data()
                .await?
                .and_then(|data| IBeaconFrame::find(&data));
            let battery_level = device.battery_percentage().await.ok().flatten();

            let uuid = peripheral_uuid(&address.to_string());
            Ok(Some(Advertisement {
                local_name: name.clone(),
                id: uuid.clone(),
                uuid,
                name,
                address_type,
                rssi,
                calibrated_power: tx_power.or_else(|| ibeacon.map(|f| i16::from(f.measured_power))),
                battery_level,
            }))
        }

        /// Connect to a peripheral.
        ///
        /// # Errors
        ///
        /// Returns [`BeaconError::ConnectionFailed`]; no reconnect is attempted.
        pub async fn connect(&self, address: &str) -> BeaconResult<()> {
            let device = self
                .adapter
                .device(bluez_address(address)?)
                .map_err(|e| connection_failed(address, &e))?;
            device
                .connect()
                .await
                .map_err(|e| connection_failed(address, &e))?;
            info!(address, "Connected");
            Ok(())
        }

        /// Disconnect from a peripheral.
        ///
        /// # Errors
        ///
        /// Returns [`BeaconError::ConnectionFailed`] if BlueZ rejects the request.
        pub async fn disconnect(&self, address: &str) -> BeaconResult<()> {
            let device = self
                .adapter
                .device(bluez_address(address)?)
                .map_err(|e| connection_failed(address, &e))?;
            device
                .disconnect()
                .await
                .map_err(|e| connection_failed(address, &e))?;
            info!(address, "Disconnected");
            Ok(())
        }
    }

    #[async_trait]
    impl AdvertisementScanner for BluezScanner {
        async fn scan_advertisements(&self) -> BeaconResult<Vec<Advertisement>> {
            self.scan().await
        }
    }

    fn scan_failed(e: bluer::Error) -> BeaconError {
        BeaconError::BluetoothScanFailed(e.to_string())
    }

    fn connection_failed(address: &str, e: &bluer::Error) -> BeaconError {
        BeaconError::ConnectionFailed {
            address: address.to_string(),
            message: e.to_string(),
        }
    }

    /// Accepts both `AA:BB:CC:DD:EE:FF` and the separator-less peripheral uuid.
    fn bluez_address(address: &str) -> BeaconResult<Address> {
        let hex = peripheral_uuid(address);
        let invalid = || BeaconError::ConnectionFailed {
            address: address.to_string(),
            message: "not a Bluetooth address".to_string(),
        };
        if hex.len() != 12 {
            return Err(invalid());
        }
        let formatted = hex
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(":");
        Address::from_str(&formatted).map_err(|_| invalid())
    }

}

#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth"), test))]
mod mock {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    use super::{async_trait, AdvertisementScanner, BeaconResult};
    use crate::types::Advertisement;

    /// Scripted scanner.
    ///
    /// Queued batches are returned first, in order; after that every scan
    /// returns the visible set.
    #[derive(Debug, Default)]
    pub struct MockScanner {
        batches: Mutex<VecDeque<BeaconResult<Vec<Advertisement>>>>,
        visible: Mutex<Vec<Advertisement>>,
        scans: AtomicUsize,
    }

    impl MockScanner {
        /// Scanner that sees nothing.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the result of one upcoming scan.
        pub fn push_batch(&self, batch: BeaconResult<Vec<Advertisement>>) {
            self.batches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(batch);
        }

        /// Replace what scans return once the queue is empty.
        pub fn set_visible(&self, advertisements: Vec<Advertisement>) {
            *self.visible.lock().unwrap_or_else(PoisonError::into_inner) = advertisements;
        }

        /// Number of scans performed so far.
        #[must_use]
        pub fn scan_count(&self) -> usize {
            self.scans.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AdvertisementScanner for MockScanner {
        async fn scan_advertisements(&self) -> BeaconResult<Vec<Advertisement>> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            let queued = self
                .batches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            queued.unwrap_or_else(|| {
                Ok(self
                    .visible
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BeaconError;
    use crate::testing::advertisement;

    #[test]
    fn test_peripheral_uuid_normalizes_address() {
        assert_eq!(peripheral_uuid("AA:BB:CC:DD:EE:0F"), "aabbccddee0f");
        assert_eq!(peripheral_uuid("aabbccddee0f"), "aabbccddee0f");
    }

    #[tokio::test]
    async fn test_mock_returns_queue_then_visible() {
        let scanner = MockScanner::new();
        scanner.set_visible(vec![advertisement(Some("iBeacon"), "u1", -60)]);
        scanner.push_batch(Err(BeaconError::BluetoothScanFailed("busy".into())));

        assert!(scanner.scan_advertisements().await.is_err());
        assert_eq!(scanner.scan_advertisements().await.unwrap().len(), 1);
        assert_eq!(scanner.scan_advertisements().await.unwrap().len(), 1);
        assert_eq!(scanner.scan_count(), 3);
    }
}
