//! The scheduled event store: a durable registry of future triggers.
//!
//! Triggers are keyed by `(normalized target minute, trigger id)`, which is
//! the firing order contract: earlier targets first, and creation order
//! (UUID v7) breaks ties between triggers sharing a target. The store owns
//! trigger records exclusively; callers hold only ids.
//!
//! Firing is split into a read-only *plan* and a mutating *commit* so the
//! clock authority can persist the consequences of an advance before the
//! in-memory state changes. `due` composes the two for callers that do not
//! need the split.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use sundial_types::{ScheduledTrigger, TriggerId, WorldTimestamp};
use tracing::debug;
use uuid::Uuid;

use crate::calendar::{Calendar, CalendarError};

/// Errors returned by scheduling operations.
///
/// These are recoverable, caller-facing failures: they are returned as
/// values, never raised as faults.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The target timestamp cannot be expressed under the active calendar.
    #[error("unreachable target: {source}")]
    UnreachableTarget {
        /// The underlying calendar error.
        #[from]
        source: CalendarError,
    },

    /// A recurrence interval of zero minutes would fire forever at one
    /// instant.
    #[error("recurrence interval must be at least 1 minute")]
    ZeroRecurrence,
}

/// One firing owed to the bus: a due trigger at one of its occurrences.
#[derive(Debug, Clone, PartialEq)]
pub struct DueFiring {
    /// The fired trigger's id.
    pub trigger_id: TriggerId,
    /// The occurrence's target timestamp (for recurring triggers this may
    /// be any elapsed occurrence, not just the first).
    pub target: WorldTimestamp,
    /// Normalized minute count of `target`.
    pub target_minutes: u64,
    /// The trigger's payload.
    pub payload: Value,
    /// The trigger's owner reference, if any.
    pub owner: Option<String>,
}

/// The staged consequences of one due pass, computed without mutating the
/// store.
#[derive(Debug, Clone, Default)]
pub struct DuePlan {
    /// Firings in delivery order: `(target minutes, trigger id)` ascending.
    pub firings: Vec<DueFiring>,
    /// One-shot triggers to delete.
    pub removals: Vec<TriggerId>,
    /// Recurring triggers with their updated target, to move forward.
    pub reschedules: Vec<ScheduledTrigger>,
}

impl DuePlan {
    /// Whether this plan changes anything.
    pub fn is_empty(&self) -> bool {
        self.firings.is_empty()
    }
}

/// Interior state: the time-ordered map plus an id index for cancellation.
#[derive(Debug, Default)]
struct TriggerStoreInner {
    by_time: BTreeMap<(u64, TriggerId), ScheduledTrigger>,
    index: HashMap<TriggerId, u64>,
}

/// Registry of future triggers, ordered by `(target, id)`.
///
/// Reads are concurrent; mutation happens under a short-lived write lock
/// and never overlaps an `advance`'s persistence await (the authority
/// computes a [`DuePlan`] first, persists, then commits).
#[derive(Debug, Default)]
pub struct TriggerStore {
    inner: RwLock<TriggerStoreInner>,
}

impl TriggerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a trigger built by the caller.
    ///
    /// Past-dated targets are accepted: they fire on the very next advance.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnreachableTarget`] if the target does not
    /// normalize under `calendar`, or [`ScheduleError::ZeroRecurrence`] for
    /// a zero-minute interval.
    pub fn schedule(
        &self,
        calendar: &Calendar,
        trigger: ScheduledTrigger,
    ) -> Result<TriggerId, ScheduleError> {
        if trigger.recurrence == Some(0) {
            return Err(ScheduleError::ZeroRecurrence);
        }
        let target_minutes = calendar.to_minutes(&trigger.target)?;
        let id = trigger.id;

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.index.insert(id, target_minutes);
        inner.by_time.insert((target_minutes, id), trigger);
        debug!(trigger_id = %id, target_minutes, "Trigger scheduled");
        Ok(id)
    }

    /// Remove a pending trigger, returning the removed record.
    ///
    /// Returns `None` for ids that are unknown or already fired; this is
    /// a no-op, not an error. The record is handed back so the caller can
    /// reinstate it if unregistering from the persistence boundary fails.
    pub fn cancel(&self, id: TriggerId) -> Option<ScheduledTrigger> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let target_minutes = inner.index.remove(&id)?;
        let removed = inner.by_time.remove(&(target_minutes, id));
        debug!(trigger_id = %id, removed = removed.is_some(), "Trigger cancelled");
        removed
    }

    /// Number of pending triggers.
    pub fn pending_count(&self) -> u64 {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        u64::try_from(inner.by_time.len()).unwrap_or(u64::MAX)
    }

    /// Clone out every pending trigger in firing order.
    pub fn snapshot(&self) -> Vec<ScheduledTrigger> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_time.values().cloned().collect()
    }

    /// Bulk-load triggers restored from the persistence boundary.
    ///
    /// Triggers that do not normalize under `calendar` are skipped with a
    /// warning rather than aborting startup; a calendar change between
    /// runs can orphan stored targets.
    pub fn restore(&self, calendar: &Calendar, triggers: Vec<ScheduledTrigger>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for trigger in triggers {
            match calendar.to_minutes(&trigger.target) {
                Ok(target_minutes) => {
                    inner.index.insert(trigger.id, target_minutes);
                    inner.by_time.insert((target_minutes, trigger.id), trigger);
                }
                Err(err) => {
                    tracing::warn!(
                        trigger_id = %trigger.id,
                        error = %err,
                        "Skipping restored trigger with unreachable target"
                    );
                }
            }
        }
    }

    /// Compute the consequences of the clock reaching `as_of_minutes`,
    /// without mutating the store.
    ///
    /// Every elapsed occurrence of a recurring trigger produces its own
    /// firing, so occurrences are never batched or skipped no matter how
    /// large the advance was. Firings are ordered by
    /// `(occurrence target, trigger id)`.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnreachableTarget`] if a recurring
    /// trigger's next target overflows the calendar range.
    pub fn plan_due(
        &self,
        calendar: &Calendar,
        as_of_minutes: u64,
    ) -> Result<DuePlan, ScheduleError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        let mut plan = DuePlan::default();
        let upper = (as_of_minutes, TriggerId::from(Uuid::max()));

        for ((target_minutes, id), trigger) in inner.by_time.range(..=upper) {
            match trigger.recurrence {
                None => {
                    plan.firings.push(DueFiring {
                        trigger_id: *id,
                        target: trigger.target,
                        target_minutes: *target_minutes,
                        payload: trigger.payload.clone(),
                        owner: trigger.owner.clone(),
                    });
                    plan.removals.push(*id);
                }
                Some(interval) => {
                    let mut occurrence = *target_minutes;
                    while occurrence <= as_of_minutes {
                        let target = calendar.from_minutes(occurrence)?;
                        plan.firings.push(DueFiring {
                            trigger_id: *id,
                            target,
                            target_minutes: occurrence,
                            payload: trigger.payload.clone(),
                            owner: trigger.owner.clone(),
                        });
                        occurrence = occurrence
                            .checked_add(interval)
                            .ok_or(CalendarError::Overflow)
                            .map_err(ScheduleError::from)?;
                    }
                    let mut moved = trigger.clone();
                    moved.target = calendar.from_minutes(occurrence)?;
                    plan.reschedules.push(moved);
                }
            }
        }

        plan.firings
            .sort_by(|a, b| (a.target_minutes, a.trigger_id).cmp(&(b.target_minutes, b.trigger_id)));
        Ok(plan)
    }

    /// Apply a previously computed [`DuePlan`]: delete fired one-shots and
    /// move recurring triggers to their next occurrence.
    ///
    /// Commits are keyed by explicit trigger ids, so triggers scheduled
    /// concurrently between plan and commit are untouched (they fire on the
    /// next advance, as past-dated triggers do).
    pub fn commit_due(&self, calendar: &Calendar, plan: &DuePlan) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        for id in &plan.removals {
            if let Some(target_minutes) = inner.index.remove(id) {
                inner.by_time.remove(&(target_minutes, *id));
            }
        }

        for trigger in &plan.reschedules {
            let Ok(new_minutes) = calendar.to_minutes(&trigger.target) else {
                continue;
            };
            if let Some(old_minutes) = inner.index.insert(trigger.id, new_minutes) {
                inner.by_time.remove(&(old_minutes, trigger.id));
            }
            inner.by_time.insert((new_minutes, trigger.id), trigger.clone());
        }
    }

    /// Report and consume everything due at `as_of_minutes` in one step.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnreachableTarget`] if a recurring
    /// trigger's next target overflows the calendar range.
    pub fn due(
        &self,
        calendar: &Calendar,
        as_of_minutes: u64,
    ) -> Result<Vec<DueFiring>, ScheduleError> {
        let plan = self.plan_due(calendar, as_of_minutes)?;
        self.commit_due(calendar, &plan);
        Ok(plan.firings)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use sundial_types::WorldTimestamp;

    use super::*;
    use crate::config::CalendarSpec;

    fn calendar() -> Calendar {
        Calendar::new(&CalendarSpec::default()).unwrap()
    }

    fn trigger_at(target: WorldTimestamp, recurrence: Option<u64>) -> ScheduledTrigger {
        ScheduledTrigger {
            id: TriggerId::new(),
            target,
            payload: serde_json::json!({"kind": "test"}),
            owner: None,
            recurrence,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn one_shot_fires_once_and_is_deleted() {
        let cal = calendar();
        let store = TriggerStore::new();
        let target = cal.timestamp(1, 1, 1, 2, 0).unwrap();
        let id = store.schedule(&cal, trigger_at(target, None)).unwrap();

        let as_of = cal.to_minutes(&cal.timestamp(1, 1, 1, 3, 0).unwrap()).unwrap();
        let fired = store.due(&cal, as_of).unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired.first().unwrap().trigger_id, id);
        assert_eq!(store.pending_count(), 0);

        // Nothing left for the same or any later crossing.
        let fired = store.due(&cal, as_of).unwrap();
        assert!(fired.is_empty());
    }

    #[test]
    fn not_due_before_target() {
        let cal = calendar();
        let store = TriggerStore::new();
        let target = cal.timestamp(1, 1, 2, 0, 0).unwrap();
        store.schedule(&cal, trigger_at(target, None)).unwrap();

        let as_of = cal.to_minutes(&cal.timestamp(1, 1, 1, 23, 59).unwrap()).unwrap();
        assert!(store.due(&cal, as_of).unwrap().is_empty());
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn firing_order_is_target_then_id() {
        let cal = calendar();
        let store = TriggerStore::new();
        let late = cal.timestamp(1, 1, 1, 10, 0).unwrap();
        let early = cal.timestamp(1, 1, 1, 5, 0).unwrap();

        let id_late = store.schedule(&cal, trigger_at(late, None)).unwrap();
        let id_early_a = store.schedule(&cal, trigger_at(early, None)).unwrap();
        let id_early_b = store.schedule(&cal, trigger_at(early, None)).unwrap();

        let as_of = cal.to_minutes(&cal.timestamp(1, 1, 1, 12, 0).unwrap()).unwrap();
        let fired = store.due(&cal, as_of).unwrap();
        let order: Vec<TriggerId> = fired.iter().map(|f| f.trigger_id).collect();

        // Same-target triggers fire in id (creation) order, before the
        // later target.
        assert_eq!(order, vec![id_early_a, id_early_b, id_late]);
    }

    #[test]
    fn recurring_reschedules_atomically() {
        let cal = calendar();
        let store = TriggerStore::new();
        let target = cal.timestamp(1, 1, 1, 6, 0).unwrap();
        let id = store.schedule(&cal, trigger_at(target, Some(1440))).unwrap();

        let as_of = cal.to_minutes(&cal.timestamp(1, 1, 1, 7, 0).unwrap()).unwrap();
        let fired = store.due(&cal, as_of).unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(store.pending_count(), 1);

        // Next occurrence is tomorrow 06:00.
        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.first().map(|t| t.target),
            Some(cal.timestamp(1, 1, 2, 6, 0).unwrap())
        );
        assert_eq!(snapshot.first().map(|t| t.id), Some(id));
    }

    #[test]
    fn large_advance_fires_every_occurrence() {
        let cal = calendar();
        let store = TriggerStore::new();
        let target = cal.timestamp(1, 1, 1, 6, 0).unwrap();
        store.schedule(&cal, trigger_at(target, Some(1440))).unwrap();

        // Three days later: occurrences on days 1, 2, 3, and 4 at 06:00.
        let as_of = cal.to_minutes(&cal.timestamp(1, 1, 4, 6, 0).unwrap()).unwrap();
        let fired = store.due(&cal, as_of).unwrap();
        assert_eq!(fired.len(), 4);
        let targets: Vec<u32> = fired.iter().map(|f| f.target.day).collect();
        assert_eq!(targets, vec![1, 2, 3, 4]);
    }

    #[test]
    fn cancel_pending_succeeds_cancel_fired_is_noop() {
        let cal = calendar();
        let store = TriggerStore::new();
        let target = cal.timestamp(1, 1, 1, 2, 0).unwrap();
        let id = store.schedule(&cal, trigger_at(target, None)).unwrap();

        assert!(store.cancel(id).is_some());
        assert!(store.cancel(id).is_none());

        let id = store.schedule(&cal, trigger_at(target, None)).unwrap();
        let as_of = cal.to_minutes(&cal.timestamp(1, 1, 1, 3, 0).unwrap()).unwrap();
        store.due(&cal, as_of).unwrap();
        assert!(store.cancel(id).is_none());
    }

    #[test]
    fn zero_recurrence_is_rejected() {
        let cal = calendar();
        let store = TriggerStore::new();
        let target = cal.timestamp(1, 1, 1, 2, 0).unwrap();
        let result = store.schedule(&cal, trigger_at(target, Some(0)));
        assert!(matches!(result, Err(ScheduleError::ZeroRecurrence)));
    }

    #[test]
    fn plan_does_not_mutate_until_commit() {
        let cal = calendar();
        let store = TriggerStore::new();
        let target = cal.timestamp(1, 1, 1, 2, 0).unwrap();
        store.schedule(&cal, trigger_at(target, None)).unwrap();

        let as_of = cal.to_minutes(&cal.timestamp(1, 1, 1, 3, 0).unwrap()).unwrap();
        let plan = store.plan_due(&cal, as_of).unwrap();
        assert!(!plan.is_empty());
        assert_eq!(plan.firings.len(), 1);
        assert_eq!(store.pending_count(), 1);

        store.commit_due(&cal, &plan);
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn restore_rebuilds_firing_order() {
        let cal = calendar();
        let store = TriggerStore::new();
        let a = trigger_at(cal.timestamp(1, 1, 2, 0, 0).unwrap(), None);
        let b = trigger_at(cal.timestamp(1, 1, 1, 12, 0).unwrap(), None);
        store.restore(&cal, vec![a.clone(), b.clone()]);

        assert_eq!(store.pending_count(), 2);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.first().map(|t| t.id), Some(b.id));
        assert_eq!(snapshot.get(1).map(|t| t.id), Some(a.id));
    }
}
