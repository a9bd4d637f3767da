//! Debounced presence detection.
//!
//! Raw "seen"/"not seen" observations are noisy: a beacon in range regularly
//! drops out of a single scan, and reflections occasionally let a distant one
//! through. [`PresenceDebouncer`] only flips its confirmed state after a run of
//! consecutive disagreeing observations, with separate run lengths for entering
//! and leaving.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Run lengths required to confirm a change in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Thresholds {
    /// Consecutive sightings needed to declare a beacon present.
    #[schema(example = 1)]
    pub inside: u32,

    /// Consecutive misses needed to declare a beacon absent.
    #[schema(example = 5)]
    pub outside: u32,
}

impl Thresholds {
    /// Create thresholds for both directions.
    #[must_use]
    pub const fn new(inside: u32, outside: u32) -> Self {
        Self { inside, outside }
    }

    const fn required(self, seen: bool) -> u32 {
        if seen {
            self.inside
        } else {
            self.outside
        }
    }
}

/// A confirmed change of presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// The beacon came into range.
    Entered,
    /// The beacon left range.
    Left,
}

impl Transition {
    /// The presence flag after this transition.
    #[must_use]
    pub const fn detected(self) -> bool {
        matches!(self, Self::Entered)
    }
}

/// Outcome of feeding one observation to the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Observation {
    /// The observation agreed with the confirmed state.
    Reaffirmed,
    /// The observation disagreed, but the run is not long enough yet.
    Pending {
        /// Disagreeing observations so far.
        count: u32,
        /// Observations needed to confirm.
        required: u32,
    },
    /// The run reached its threshold and the state flipped.
    Confirmed {
        /// Direction of the change.
        transition: Transition,
    },
}

/// Two-state presence machine with per-direction hysteresis.
///
/// The single counter only ever holds progress toward the state opposite the
/// confirmed one; any agreeing observation clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceDebouncer {
    detected: bool,
    change_detected: u32,
}

impl PresenceDebouncer {
    /// Start from a confirmed state with no progress.
    #[must_use]
    pub const fn new(detected: bool) -> Self {
        Self {
            detected,
            change_detected: 0,
        }
    }

    /// Current confirmed presence.
    #[must_use]
    pub const fn detected(&self) -> bool {
        self.detected
    }

    /// Disagreeing observations accumulated so far.
    #[must_use]
    pub const fn change_detected(&self) -> u32 {
        self.change_detected
    }

    /// Feed one observation.
    pub fn observe(&mut self, seen: bool, thresholds: Thresholds) -> Observation {
        if seen == self.detected {
            self.change_detected = 0;
            return Observation::Reaffirmed;
        }

        self.change_detected = self.change_detected.saturating_add(1);
        let required = thresholds.required(seen);

        if self.change_detected >= required {
            self.detected = seen;
            self.change_detected = 0;
            let transition = if seen {
                Transition::Entered
            } else {
                Transition::Left
            };
            return Observation::Confirmed { transition };
        }

        Observation::Pending {
            count: self.change_detected,
            required,
        }
    }
}
