//! Matching advertisements to drivers and devices.

use crate::error::{BeaconError, BeaconResult};
use crate::types::{Advertisement, CandidateData, CapabilityId, PairingCandidate};

/// Matches advertisements against one driver's broadcast identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatcher {
    identifier: String,
    display_name: String,
}

impl DeviceMatcher {
    /// Matcher for advertisements named `identifier`; candidates are named after `display_name`.
    pub fn new(identifier: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
        }
    }

    /// The broadcast name this matcher accepts.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Turn every advertisement named after the identifier into a pairing candidate.
    ///
    /// Candidates keep the batch order and are numbered from 1.
    #[must_use]
    pub fn match_advertisements(&self, advertisements: &[Advertisement]) -> Vec<PairingCandidate> {
        advertisements
            .iter()
            .filter(|ad| ad.local_name.as_deref() == Some(self.identifier.as_str()))
            .enumerate()
            .map(|(i, ad)| PairingCandidate {
                name: format!("{} {}", self.display_name, i + 1),
                data: CandidateData {
                    id: ad.id.clone(),
                    uuid: ad.uuid.clone(),
                    address: ad.uuid.clone(),
                    name: ad.name.clone(),
                    address_type: ad.address_type.clone(),
                    version: format!("v{}", env!("CARGO_PKG_VERSION")),
                },
                capabilities: vec![CapabilityId::DETECT],
            })
            .collect()
    }

    /// Find the advertisement of an already paired device.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::DeviceNotFound`] when nothing carries the address
    /// and [`BeaconError::AmbiguousAdvertisement`] when several do.
    pub fn locate<'a>(
        advertisements: &'a [Advertisement],
        address: &str,
    ) -> BeaconResult<&'a Advertisement> {
        let mut matches = advertisements.iter().filter(|ad| ad.uuid == address);
        let first = matches
            .next()
            .ok_or_else(|| BeaconError::DeviceNotFound(address.to_string()))?;
        let extra = matches.count();
        if extra > 0 {
            return Err(BeaconError::AmbiguousAdvertisement {
                address: address.to_string(),
                count: extra + 1,
            });
        }
        Ok(first)
    }
}
