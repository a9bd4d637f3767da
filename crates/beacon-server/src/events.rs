//! Trigger sink that logs every card and keeps the most recent ones.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use beacon_core::{BeaconResult, Trigger, TriggerSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

/// Number of events kept when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 256;

/// A delivered trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EventEntry {
    /// The trigger as fired.
    pub trigger: Trigger,

    /// When it was fired.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub fired_at: DateTime<Utc>,
}

/// Bounded in-memory log of fired triggers.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<EventEntry>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    /// Log keeping at most `capacity` entries; the oldest are dropped first.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Up to `limit` entries, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<EventEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been fired yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TriggerSink for EventLog {
    async fn trigger(&self, trigger: &Trigger) -> BeaconResult<()> {
        info!(
            card = %trigger.card,
            device_id = trigger.device_id.as_deref().unwrap_or("-"),
            beacon = %trigger.payload.beacon,
            detected = ?trigger.payload.detected,
            "Trigger fired"
        );

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(EventEntry {
            trigger: trigger.clone(),
            fired_at: Utc::now(),
        });
        Ok(())
    }
}
