//! Enumeration types for the Sundial world-time kernel.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Seasons
// ---------------------------------------------------------------------------

/// A season of the game year.
///
/// Which seasons exist and where their boundaries fall is decided by the
/// calendar configuration; this enum is the closed vocabulary the boundary
/// table maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Season {
    /// Growth season.
    Spring,
    /// Hot season.
    Summer,
    /// Harvest season.
    Autumn,
    /// Cold season.
    Winter,
}

// ---------------------------------------------------------------------------
// Time-of-day blocks
// ---------------------------------------------------------------------------

/// A categorical block of the game day.
///
/// Block boundaries come from the calendar configuration and may wrap past
/// midnight (a night block spanning the late evening into the early morning
/// is a single block, not two).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeBlock {
    /// First light.
    Dawn,
    /// Morning hours.
    Morning,
    /// Midday through late afternoon.
    Afternoon,
    /// Fading light.
    Dusk,
    /// Night hours.
    Night,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Discriminant of a [`Notification`](crate::Notification), used for
/// subscription filtering and cache eviction matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A derived category (season or time block) changed.
    CategoryChanged,
    /// A scheduled trigger came due.
    TriggerFired,
    /// Time advanced.
    TimeProgressed,
    /// An async work item failed permanently.
    WorkFailed,
}

// ---------------------------------------------------------------------------
// Async work
// ---------------------------------------------------------------------------

/// Lifecycle state of an async work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkStatus {
    /// Accepted, waiting for a worker.
    Queued,
    /// A worker is executing it.
    Running,
    /// Finished successfully; result available.
    Done,
    /// Exhausted its retry budget.
    Failed,
    /// Cancelled before completion; any in-flight result is discarded.
    Cancelled,
}

impl WorkStatus {
    /// Whether this status is terminal (no further transitions).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Cache scopes
// ---------------------------------------------------------------------------

/// Eviction scope of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CacheScope {
    /// Evicted by the next `TimeProgressed` notification.
    UntilTimeProgressed,
    /// Evicted by the next `CategoryChanged` notification.
    UntilCategoryChange,
    /// Evicted only by an explicit remove.
    Manual,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_status_terminality() {
        assert!(!WorkStatus::Queued.is_terminal());
        assert!(!WorkStatus::Running.is_terminal());
        assert!(WorkStatus::Done.is_terminal());
        assert!(WorkStatus::Failed.is_terminal());
        assert!(WorkStatus::Cancelled.is_terminal());
    }

    #[test]
    fn enums_roundtrip_serde() {
        let json = serde_json::to_string(&Season::Winter).ok();
        assert_eq!(json.as_deref(), Some("\"Winter\""));
        let block: Result<TimeBlock, _> = serde_json::from_str("\"Night\"");
        assert_eq!(block.ok(), Some(TimeBlock::Night));
    }
}
