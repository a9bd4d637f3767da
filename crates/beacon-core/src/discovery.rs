//! Pairing-time discovery.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{BeaconError, BeaconResult};
use crate::host::AdvertisementScanner;
use crate::matcher::DeviceMatcher;
use crate::types::PairingCandidate;

/// Delay before the single discovery retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Scan for candidates, retrying exactly once after `retry_delay` if the first scan finds none.
///
/// # Errors
///
/// Returns [`BeaconError::NoDevicesFound`] if both scans come back empty, and
/// propagates scanner failures without retrying them.
pub async fn discover_devices(
    scanner: &dyn AdvertisementScanner,
    matcher: &DeviceMatcher,
    retry_delay: Duration,
) -> BeaconResult<Vec<PairingCandidate>> {
    let candidates = search(scanner, matcher).await?;
    if !candidates.is_empty() {
        return Ok(candidates);
    }

    debug!(
        identifier = matcher.identifier(),
        delay = ?retry_delay,
        "No candidates on first scan, retrying once"
    );
    tokio::time::sleep(retry_delay).await;

    let candidates = search(scanner, matcher).await?;
    if candidates.is_empty() {
        return Err(BeaconError::NoDevicesFound {
            identifier: matcher.identifier().to_string(),
        });
    }
    Ok(candidates)
}

async fn search(
    scanner: &dyn AdvertisementScanner,
    matcher: &DeviceMatcher,
) -> BeaconResult<Vec<PairingCandidate>> {
    let advertisements = scanner.scan_advertisements().await.map_err(|e| match e {
        BeaconError::BluetoothScanFailed(_) | BeaconError::BluetoothAdapterNotFound => e,
        other => BeaconError::BluetoothScanFailed(other.to_string()),
    })?;
    let candidates = matcher.match_advertisements(&advertisements);
    info!(
        identifier = matcher.identifier(),
        advertisements = advertisements.len(),
        candidates = candidates.len(),
        "Discovery scan complete"
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::MockScanner;
    use crate::testing::advertisement;
    use tokio::time::Instant;
    use tokio_test::assert_ok;

    fn matcher() -> DeviceMatcher {
        DeviceMatcher::new("iBeacon", "iBeacon")
    }

    #[tokio::test]
    async fn test_first_scan_hit_does_not_retry() {
        let scanner = MockScanner::new();
        scanner.push_batch(Ok(vec![advertisement(Some("iBeacon"), "u1", -60)]));

        let found = assert_ok!(discover_devices(&scanner, &matcher(), DEFAULT_RETRY_DELAY).await);

        assert_eq!(found.len(), 1);
        assert_eq!(scanner.scan_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_first_scan_retries_after_delay() {
        let scanner = MockScanner::new();
        scanner.push_batch(Ok(vec![advertisement(Some("Other"), "u1", -60)]));
        scanner.push_batch(Ok(vec![advertisement(Some("iBeacon"), "u2", -60)]));

        let start = Instant::now();
        let found = assert_ok!(discover_devices(&scanner, &matcher(), DEFAULT_RETRY_DELAY).await);

        assert_eq!(found[0].data.address, "u2");
        assert_eq!(scanner.scan_count(), 2);
        assert!(start.elapsed() >= DEFAULT_RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_empty_scans_report_not_found() {
        let scanner = MockScanner::new();

        let err = discover_devices(&scanner, &matcher(), DEFAULT_RETRY_DELAY)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BeaconError::NoDevicesFound { ref identifier } if identifier == "iBeacon"
        ));
        assert_eq!(scanner.scan_count(), 2);
    }

    #[tokio::test]
    async fn test_scan_failure_is_not_retried() {
        let scanner = MockScanner::new();
        scanner.push_batch(Err(BeaconError::BluetoothScanFailed("adapter busy".into())));

        let err = discover_devices(&scanner, &matcher(), DEFAULT_RETRY_DELAY)
            .await
            .unwrap_err();

        assert!(err.is_discovery_error());
        assert_eq!(scanner.scan_count(), 1);
    }
}
