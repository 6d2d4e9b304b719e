//! The operational status surface.

use serde::{Deserialize, Serialize};

use crate::timestamp::WorldTimestamp;

/// A point-in-time snapshot of the kernel's operational state.
///
/// This is the complete data contract consumed by whatever observability
/// layer sits on top of the kernel; it is a plain serializable projection
/// so readers never hold kernel locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Current world timestamp.
    pub timestamp: WorldTimestamp,
    /// Number of triggers waiting in the scheduled event store.
    pub pending_triggers: u64,
    /// Async work items accepted but not yet picked up by a worker.
    pub queue_depth: u64,
    /// Async work items currently executing.
    pub in_flight: u64,
    /// Cache lookups answered from the cache.
    pub cache_hits: u64,
    /// Cache lookups that missed.
    pub cache_misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_roundtrips() {
        let report = StatusReport {
            timestamp: WorldTimestamp::from_fields(2, 6, 1, 12, 30),
            pending_triggers: 4,
            queue_depth: 1,
            in_flight: 2,
            cache_hits: 100,
            cache_misses: 7,
        };
        let json = serde_json::to_string(&report).ok();
        assert!(json.is_some());
        let back: Result<StatusReport, _> =
            serde_json::from_str(json.as_deref().unwrap_or(""));
        assert_eq!(back.ok(), Some(report));
    }
}
