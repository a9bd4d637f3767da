//! Trigger cards and notification fan-out.
//!
//! A confirmed transition produces four trigger cards: an app-wide range card,
//! a device-scoped range card, and the app-wide and device-scoped state-change
//! cards. They are delivered concurrently, and each delivery succeeds or fails
//! on its own.

use std::fmt;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::host::TriggerSink;
use crate::presence::Transition;

/// Trigger cards emitted on presence changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCard {
    /// Any beacon came into range.
    BeaconInsideRange,
    /// This device came into range.
    DeviceBeaconInsideRange,
    /// Any beacon left range.
    BeaconOutsideRange,
    /// This device left range.
    DeviceBeaconOutsideRange,
    /// Any beacon changed state.
    BeaconStateChanged,
    /// This device changed state.
    DeviceBeaconStateChanged,
}

impl TriggerCard {
    /// Card id as registered with the host.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::BeaconInsideRange => "beacon_inside_range",
            Self::DeviceBeaconInsideRange => "device_beacon_inside_range",
            Self::BeaconOutsideRange => "beacon_outside_range",
            Self::DeviceBeaconOutsideRange => "device_beacon_outside_range",
            Self::BeaconStateChanged => "beacon_state_changed",
            Self::DeviceBeaconStateChanged => "device_beacon_state_changed",
        }
    }

    /// Whether the card is bound to a single device.
    #[must_use]
    pub const fn is_device_scoped(self) -> bool {
        matches!(
            self,
            Self::DeviceBeaconInsideRange
                | Self::DeviceBeaconOutsideRange
                | Self::DeviceBeaconStateChanged
        )
    }
}

impl fmt::Display for TriggerCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Tokens carried by a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TriggerPayload {
    /// Device name; omitted on device-scoped cards, which carry the device itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Beacon name.
    pub beacon: String,

    /// New presence flag, on state-change cards only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected: Option<bool>,
}

/// One trigger to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Trigger {
    /// Card to fire.
    pub card: TriggerCard,

    /// Target device id for device-scoped cards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Card tokens.
    pub payload: TriggerPayload,
}

impl Trigger {
    /// The four triggers for a confirmed transition of one device.
    #[must_use]
    pub fn for_transition(device_id: &str, name: &str, transition: Transition) -> Vec<Self> {
        let (app_card, device_card) = match transition {
            Transition::Entered => (
                TriggerCard::BeaconInsideRange,
                TriggerCard::DeviceBeaconInsideRange,
            ),
            Transition::Left => (
                TriggerCard::BeaconOutsideRange,
                TriggerCard::DeviceBeaconOutsideRange,
            ),
        };
        let detected = transition.detected();

        vec![
            Self::app(app_card, name, None),
            Self::device(device_card, device_id, name, None),
            Self::app(TriggerCard::BeaconStateChanged, name, Some(detected)),
            Self::device(
                TriggerCard::DeviceBeaconStateChanged,
                device_id,
                name,
                Some(detected),
            ),
        ]
    }

    fn app(card: TriggerCard, name: &str, detected: Option<bool>) -> Self {
        Self {
            card,
            device_id: None,
            payload: TriggerPayload {
                device: Some(name.to_string()),
                beacon: name.to_string(),
                detected,
            },
        }
    }

    fn device(card: TriggerCard, device_id: &str, name: &str, detected: Option<bool>) -> Self {
        Self {
            card,
            device_id: Some(device_id.to_string()),
            payload: TriggerPayload {
                device: None,
                beacon: name.to_string(),
                detected,
            },
        }
    }
}

/// Delivery summary of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Triggers the sink accepted.
    pub delivered: usize,
    /// Triggers the sink rejected.
    pub failed: usize,
}

/// Deliver every trigger concurrently; failures are logged and counted, never propagated.
pub async fn fan_out(sink: &dyn TriggerSink, triggers: &[Trigger]) -> FanOutReport {
    let deliveries = triggers.iter().map(|trigger| async move {
        match sink.trigger(trigger).await {
            Ok(()) => {
                info!(card = %trigger.card, "Done trigger flow card");
                true
            }
            Err(e) => {
                warn!(card = %trigger.card, error = %e, "Cannot trigger flow card");
                false
            }
        }
    });

    let outcomes = join_all(deliveries).await;
    let delivered = outcomes.iter().filter(|ok| **ok).count();

    FanOutReport {
        delivered,
        failed: outcomes.len() - delivered,
    }
}
