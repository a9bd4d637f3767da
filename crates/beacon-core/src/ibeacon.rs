//! Apple iBeacon manufacturer-data frames.

use serde::Serialize;
use uuid::Uuid;

/// Bluetooth SIG company identifier for Apple.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

const FRAME_TYPE: u8 = 0x02;
const FRAME_LENGTH: u8 = 0x15;

/// Decoded iBeacon advertisement payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IBeaconFrame {
    /// Proximity UUID.
    pub proximity_uuid: Uuid,
    /// Major group number.
    pub major: u16,
    /// Minor group number.
    pub minor: u16,
    /// RSSI measured at one meter, in dBm.
    pub measured_power: i8,
}

impl IBeaconFrame {
    /// Parse the manufacturer data of one advertisement.
    ///
    /// Returns `None` unless the company id is Apple's and the payload is a
    /// complete iBeacon frame.
    #[must_use]
    pub fn parse(company_id: u16, data: &[u8]) -> Option<Self> {
        if company_id != APPLE_COMPANY_ID {
            return None;
        }
        let [FRAME_TYPE, FRAME_LENGTH, rest @ ..] = data else {
            return None;
        };
        if rest.len() < usize::from(FRAME_LENGTH) {
            return None;
        }

        let proximity_uuid = Uuid::from_slice(&rest[..16]).ok()?;
        let major = u16::from_be_bytes([rest[16], rest[17]]);
        let minor = u16::from_be_bytes([rest[18], rest[19]]);
        let measured_power = i8::from_be_bytes([rest[20]]);

        Some(Self {
            proximity_uuid,
            major,
            minor,
            measured_power,
        })
    }

    /// First iBeacon frame found in a company-id keyed manufacturer data map.
    pub fn find<'a, I>(manufacturer_data: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a u16, &'a Vec<u8>)>,
    {
        manufacturer_data
            .into_iter()
            .find_map(|(company, data)| Self::parse(*company, data))
    }
}
