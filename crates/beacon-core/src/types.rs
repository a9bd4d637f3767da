//! Shared types and OpenAPI schemas.
//!
//! Advertisements, capabilities, pairing candidates and pairing payloads are
//! shared by the matcher, the reconciler, the device runtime and the HTTP host.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// A single BLE advertisement observed during one scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "local_name": "iBeacon",
    "id": "aabbccddeeff",
    "uuid": "aabbccddeeff",
    "name": "iBeacon",
    "type": "random",
    "rssi": -65,
    "calibrated_power": -59,
    "battery_level": null
}))]
pub struct Advertisement {
    /// Broadcast local name, compared against a driver identifier.
    pub local_name: Option<String>,

    /// Scanner-assigned peripheral id.
    pub id: String,

    /// Stable peripheral identifier, used as the device address.
    pub uuid: String,

    /// Peripheral name as reported by the stack.
    pub name: Option<String>,

    /// Address type (`public` or `random`).
    #[serde(rename = "type")]
    pub address_type: String,

    /// Received signal strength in dBm.
    pub rssi: i16,

    /// Reference RSSI at one metre, when the beacon advertises it.
    #[serde(default)]
    pub calibrated_power: Option<i16>,

    /// Battery level in percent, when the beacon advertises it.
    #[serde(default)]
    pub battery_level: Option<u8>,
}

/// Identifier of a device capability slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(Cow<'static, str>);

impl CapabilityId {
    /// Confirmed presence flag.
    pub const DETECT: Self = Self(Cow::Borrowed("detect"));
    /// Last received RSSI.
    pub const SIGNAL_STRENGTH: Self = Self(Cow::Borrowed("signal_strength"));
    /// Estimated distance to the beacon.
    pub const DISTANCE: Self = Self(Cow::Borrowed("homey_distance"));
    /// Advertised battery level.
    pub const MEASURE_BATTERY: Self = Self(Cow::Borrowed("measure_battery"));

    /// Create a capability id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CapabilityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Value held by a capability slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum CapabilityValue {
    /// Flag capability such as `detect`.
    Boolean(bool),
    /// Numeric measurement.
    Number(f64),
}

impl From<bool> for CapabilityValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for CapabilityValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i16> for CapabilityValue {
    fn from(value: i16) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u8> for CapabilityValue {
    fn from(value: u8) -> Self {
        Self::Number(f64::from(value))
    }
}

impl CapabilityValue {
    /// Boolean content, if this is a flag.
    #[must_use]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(b),
            Self::Number(_) => None,
        }
    }
}

/// Opaque energy configuration of a device.
///
/// Compared structurally; an absent profile is the empty object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct EnergyProfile(pub Value);

impl Default for EnergyProfile {
    fn default() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }
}

/// Identifying data attached to a pairing candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CandidateData {
    /// Scanner peripheral id.
    pub id: String,
    /// Peripheral uuid.
    pub uuid: String,
    /// Device address; equal to the advertisement uuid.
    pub address: String,
    /// Peripheral name, if any.
    pub name: Option<String>,
    /// Address type.
    #[serde(rename = "type")]
    pub address_type: String,
    /// Integration version that produced the candidate.
    #[schema(example = "v0.1.0")]
    pub version: String,
}

/// A device offered to the user during pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PairingCandidate {
    /// Display name, `"<BeaconName> <index>"`.
    #[schema(example = "iBeacon 1")]
    pub name: String,

    /// Identifying data.
    pub data: CandidateData,

    /// Capabilities the device starts with.
    #[schema(value_type = Vec<String>, example = json!(["detect"]))]
    pub capabilities: Vec<CapabilityId>,
}

/// Settings section of a pairing payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PairSettings {
    /// Device address.
    pub address: String,
    /// Name the beacon advertises.
    pub advertised_name: Option<String>,
    /// User-facing calibrated power setting.
    pub calibrated_power: Option<i16>,
}

/// Store section of a pairing payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PairStore {
    /// Calibrated power captured at pairing time.
    #[serde(rename = "calibrated_power_", default)]
    pub calibrated_power: Option<i16>,

    /// Energy profile to apply to the device.
    #[serde(default)]
    pub energy: Option<EnergyProfile>,
}

/// Freshly observed pairing data, merged into a device by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PairObject {
    /// Settings to apply.
    pub settings: PairSettings,
    /// Store values to apply.
    #[serde(default)]
    pub store: PairStore,
    /// Desired capability set.
    #[schema(value_type = Vec<String>)]
    pub capabilities: Vec<CapabilityId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertisement_type_field_rename() {
        let json = r#"{
            "local_name": "iBeacon",
            "id": "a1",
            "uuid": "a1",
            "name": null,
            "type": "public",
            "rssi": -70
        }"#;
        let ad: Advertisement = serde_json::from_str(json).unwrap();
        assert_eq!(ad.address_type, "public");
        assert_eq!(ad.calibrated_power, None);
    }

    #[test]
    fn test_capability_id_constants_match_strings() {
        assert_eq!(CapabilityId::DETECT, CapabilityId::new("detect"));
        assert_eq!(CapabilityId::DISTANCE.as_str(), "homey_distance");
        let json = serde_json::to_string(&CapabilityId::SIGNAL_STRENGTH).unwrap();
        assert_eq!(json, "\"signal_strength\"");
    }

    #[test]
    fn test_capability_value_untagged() {
        let v: CapabilityValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, CapabilityValue::Boolean(true));
        let v: CapabilityValue = serde_json::from_str("-61").unwrap();
        assert_eq!(v, CapabilityValue::Number(-61.0));
    }

    #[test]
    fn test_energy_profile_defaults_to_empty_object() {
        assert_eq!(EnergyProfile::default().0, serde_json::json!({}));
    }

    #[test]
    fn test_energy_profile_schema_is_an_object() {
        use utoipa::PartialSchema;

        let schema = serde_json::to_value(EnergyProfile::schema()).unwrap();
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn test_pair_object_store_key() {
        let json = r#"{
            "settings": {"address": "a1", "advertised_name": "iBeacon", "calibrated_power": -59},
            "store": {"calibrated_power_": -60},
            "capabilities": ["detect", "signal_strength"]
        }"#;
        let pair: PairObject = serde_json::from_str(json).unwrap();
        assert_eq!(pair.store.calibrated_power, Some(-60));
        assert!(pair.store.energy.is_none());
        assert_eq!(pair.capabilities.len(), 2);
    }
}
