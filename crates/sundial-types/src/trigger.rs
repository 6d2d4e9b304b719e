//! Scheduled trigger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::TriggerId;
use crate::timestamp::WorldTimestamp;

/// A registered future point in game time with an associated payload.
///
/// Trigger records are owned exclusively by the scheduled event store;
/// subsystems hold only the [`TriggerId`] for cancellation. One-shot
/// triggers (no `recurrence`) are deleted when they fire; recurring
/// triggers are rescheduled to `target + recurrence` as part of the same
/// operation that reports them due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTrigger {
    /// Unique identity; also the deterministic tie-break when several
    /// triggers share a target timestamp.
    pub id: TriggerId,

    /// Game-time point at which the trigger fires.
    pub target: WorldTimestamp,

    /// Opaque payload delivered verbatim in the `TriggerFired` notification.
    pub payload: Value,

    /// Optional owning-entity reference (a buff, an NPC, a business).
    pub owner: Option<String>,

    /// Recurrence interval in game minutes; absent means one-shot.
    pub recurrence: Option<u64>,

    /// Wall-clock creation time, for bookkeeping only -- never used in
    /// firing decisions.
    pub created_at: DateTime<Utc>,
}

impl ScheduledTrigger {
    /// Whether this trigger reschedules itself after firing.
    pub const fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }
}
