//! The closed notification set delivered by the event bus.
//!
//! Notifications are transient values: they exist only for the duration of
//! a delivery pass and are never persisted. The set is deliberately closed
//! -- a tagged enum with fixed payload shapes -- so subsystem handlers can
//! be checked for exhaustiveness instead of probing loose payload maps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::{NotificationKind, Season, TimeBlock};
use crate::ids::{TriggerId, WorkId};
use crate::timestamp::WorldTimestamp;
use crate::work::IdempotencyKey;

/// A derived-category transition observed during an advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryChange {
    /// The season rolled over.
    Season {
        /// Season before the advance.
        previous: Season,
        /// Season after the advance.
        current: Season,
    },
    /// The time-of-day block rolled over.
    TimeBlock {
        /// Block before the advance.
        previous: TimeBlock,
        /// Block after the advance.
        current: TimeBlock,
    },
}

/// A discrete, ordered message describing a transition or progression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// A season or time-block boundary was crossed.
    CategoryChanged {
        /// Timestamp after the advance that crossed the boundary.
        timestamp: WorldTimestamp,
        /// Which category changed, with previous and current values.
        change: CategoryChange,
    },

    /// A scheduled trigger came due.
    TriggerFired {
        /// Timestamp after the advance that reached the target.
        timestamp: WorldTimestamp,
        /// Identity of the fired trigger.
        trigger_id: TriggerId,
        /// The target the trigger was scheduled for (may be earlier than
        /// `timestamp` when an advance overshoots it).
        target: WorldTimestamp,
        /// Opaque payload supplied at scheduling time.
        payload: Value,
        /// Owning-entity reference supplied at scheduling time, if any.
        owner: Option<String>,
    },

    /// Time advanced. Exactly one of these closes every successful advance.
    TimeProgressed {
        /// Timestamp before the advance.
        previous: WorldTimestamp,
        /// Timestamp after the advance.
        current: WorldTimestamp,
        /// Minutes advanced in this call.
        minutes: u64,
    },

    /// An async work item exhausted its retry budget.
    WorkFailed {
        /// Identity of the failed work item.
        work_id: WorkId,
        /// Idempotency key of the failed work item.
        idempotency_key: IdempotencyKey,
        /// Human-readable description of the terminal failure.
        error: String,
    },
}

impl Notification {
    /// The discriminant of this notification, for filtering.
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::CategoryChanged { .. } => NotificationKind::CategoryChanged,
            Self::TriggerFired { .. } => NotificationKind::TriggerFired,
            Self::TimeProgressed { .. } => NotificationKind::TimeProgressed,
            Self::WorkFailed { .. } => NotificationKind::WorkFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let n = Notification::TimeProgressed {
            previous: WorldTimestamp::from_fields(1, 1, 1, 0, 0),
            current: WorldTimestamp::from_fields(1, 1, 1, 2, 0),
            minutes: 120,
        };
        assert_eq!(n.kind(), NotificationKind::TimeProgressed);

        let n = Notification::WorkFailed {
            work_id: WorkId::new(),
            idempotency_key: IdempotencyKey::new("region:7:seed:42"),
            error: String::from("worker exhausted retries"),
        };
        assert_eq!(n.kind(), NotificationKind::WorkFailed);
    }

    #[test]
    fn category_change_roundtrips() {
        let change = CategoryChange::Season {
            previous: Season::Winter,
            current: Season::Spring,
        };
        let json = serde_json::to_string(&change).ok();
        assert!(json.is_some());
        let back: Result<CategoryChange, _> =
            serde_json::from_str(json.as_deref().unwrap_or(""));
        assert_eq!(back.ok(), Some(change));
    }
}
