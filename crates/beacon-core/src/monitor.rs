//! Runtime observation loop.
//!
//! Each cycle scans once and feeds the batch to every paired device.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::device::BeaconDevice;
use crate::error::{BeaconError, BeaconResult};
use crate::host::AdvertisementScanner;
use crate::matcher::DeviceMatcher;
use crate::presence::Observation;
use crate::types::Advertisement;

/// How a device showed up in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// Exactly one advertisement carried the address.
    Seen,
    /// No advertisement carried the address.
    Missing,
    /// Several advertisements carried the address.
    Ambiguous,
}

/// Result of one device's evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOutcome {
    /// Device id.
    pub device_id: String,
    /// How the device showed up.
    pub sighting: Sighting,
    /// What the debouncer made of it.
    pub observation: Observation,
}

/// Drives the scan-and-observe cycle.
pub struct Monitor {
    scanner: Arc<dyn AdvertisementScanner>,
}

impl Monitor {
    /// Monitor using `scanner` for every cycle.
    pub fn new(scanner: Arc<dyn AdvertisementScanner>) -> Self {
        Self { scanner }
    }

    /// Evaluate every device against one batch, concurrently.
    pub async fn process_batch(
        devices: &[Arc<BeaconDevice>],
        advertisements: &[Advertisement],
    ) -> Vec<DeviceOutcome> {
        join_all(
            devices
                .iter()
                .map(|device| Self::process_device(device, advertisements)),
        )
        .await
    }

    async fn process_device(
        device: &BeaconDevice,
        advertisements: &[Advertisement],
    ) -> DeviceOutcome {
        let located = DeviceMatcher::locate(advertisements, device.address());
        let (sighting, observation) = match located {
            Ok(sample) => {
                let observation = device.observe(true).await;
                device.update_capability_values(sample).await;
                (Sighting::Seen, observation)
            }
            Err(BeaconError::AmbiguousAdvertisement { count, .. }) => {
                warn!(
                    device = %device.name(),
                    count,
                    "Several advertisements share the address, readings skipped"
                );
                (Sighting::Ambiguous, device.observe(true).await)
            }
            Err(_) => (Sighting::Missing, device.observe(false).await),
        };

        DeviceOutcome {
            device_id: device.id().to_string(),
            sighting,
            observation,
        }
    }

    /// Scan once and process the batch.
    ///
    /// # Errors
    ///
    /// Propagates scanner failures; no device is touched in that case.
    pub async fn scan_and_process(
        &self,
        devices: &[Arc<BeaconDevice>],
    ) -> BeaconResult<Vec<DeviceOutcome>> {
        let advertisements = self.scanner.scan_advertisements().await?;
        debug!(
            advertisements = advertisements.len(),
            devices = devices.len(),
            "Processing scan batch"
        );
        Ok(Self::process_batch(devices, &advertisements).await)
    }

    /// Run a cycle every `interval` until `shutdown` flips or its sender is dropped.
    ///
    /// `devices` is asked for the current device list at the start of each
    /// cycle. A cycle always completes before the next one starts.
    pub async fn run<F, Fut>(
        &self,
        interval: Duration,
        devices: F,
        mut shutdown: watch::Receiver<bool>,
    ) where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Vec<Arc<BeaconDevice>>> + Send,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?interval, "Presence monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            let devices = devices().await;
            if devices.is_empty() {
                continue;
            }
            if let Err(e) = self.scan_and_process(&devices).await {
                warn!(error = %e, "Scan failed, skipping cycle");
            }
        }

        info!("Presence monitor stopped");
    }
}
