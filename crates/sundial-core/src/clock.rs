//! The clock authority: the single owner of world time.
//!
//! All advancement flows through [`TimeAuthority::advance`], which is
//! serialized -- concurrent callers queue behind an async mutex, they are
//! never rejected. One advance performs, atomically from the caller's
//! perspective:
//!
//! 1. capture the previous timestamp,
//! 2. compute the new timestamp through the calendar,
//! 3. detect season and time-block transitions,
//! 4. plan the due triggers ordered by `(target, id)`,
//! 5. persist the new timestamp and trigger consequences through the
//!    [`TimeStore`] boundary,
//! 6. commit in-memory state and publish notifications in the fixed
//!    order: season change, time-block change, trigger firings, then
//!    exactly one time-progressed.
//!
//! Persistence completes before the first notification is delivered. If it
//! fails, the call fails entirely: state stays at the previous timestamp
//! and nothing is published. Reordering these steps would let subscribers
//! observe an advance that was never durably recorded.
//!
//! Reads (`current`, `season`, `time_block`) never block behind an
//! in-flight advance.

use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use serde_json::Value;
use sundial_types::{
    CategoryChange, Notification, ScheduledTrigger, Season, TimeBlock, TriggerId, WorldTimestamp,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bus::{BusError, EventBus};
use crate::calendar::{Calendar, CalendarError};
use crate::config::SchedulerConfig;
use crate::scheduler::{ScheduleError, TriggerStore};
use crate::store::{StoreError, TimeStore};

/// Errors surfaced by the clock authority.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// `advance` requires a positive minute count.
    #[error("advance requires a positive minute count")]
    ZeroMinutes,

    /// `advance` was called from inside a notification handler.
    #[error("reentrant advance rejected: handlers must not advance the clock")]
    ReentrantAdvance,

    /// A forward scan exhausted its horizon without satisfying the
    /// predicate.
    #[error("predicate not satisfied within {horizon_minutes} minutes")]
    HorizonExceeded {
        /// The configured scan horizon.
        horizon_minutes: u64,
    },

    /// A calendar operation failed.
    #[error("calendar error: {source}")]
    Calendar {
        /// The underlying calendar error.
        #[from]
        source: CalendarError,
    },

    /// A scheduling operation failed.
    #[error("scheduling error: {source}")]
    Schedule {
        /// The underlying scheduling error.
        #[from]
        source: ScheduleError,
    },

    /// The persistence boundary failed.
    #[error("persistence error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// Notification delivery was rejected.
    #[error("bus error: {source}")]
    Bus {
        /// The underlying bus error.
        #[from]
        source: BusError,
    },
}

/// Interior state shared by all handles to one authority.
#[derive(Debug)]
struct AuthorityInner<S> {
    calendar: Calendar,
    bus: EventBus,
    triggers: TriggerStore,
    store: S,
    current: RwLock<WorldTimestamp>,
    advance_gate: Mutex<()>,
    scan_horizon_minutes: u64,
}

/// Owner of the single monotonic world-time value.
///
/// Cheap to clone; clones share state. There is no ambient global -- every
/// consumer holds a handle, and tests run as many independent clocks as
/// they like.
#[derive(Debug)]
pub struct TimeAuthority<S> {
    inner: std::sync::Arc<AuthorityInner<S>>,
}

impl<S> Clone for TimeAuthority<S> {
    fn clone(&self) -> Self {
        Self {
            inner: std::sync::Arc::clone(&self.inner),
        }
    }
}

impl<S: TimeStore> TimeAuthority<S> {
    /// Build an authority, restoring persisted state through the store.
    ///
    /// On a fresh store the clock starts at the calendar epoch (year 1,
    /// month 1, day 1, 00:00) and that timestamp is persisted immediately,
    /// so a crash before the first advance still restores cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Store`] if the boundary fails, or
    /// [`AuthorityError::Calendar`] if the persisted timestamp does not
    /// validate under the active calendar.
    pub async fn start(
        calendar: Calendar,
        config: &SchedulerConfig,
        bus: EventBus,
        store: S,
    ) -> Result<Self, AuthorityError> {
        let persisted = store.load().await?;

        let current = match persisted.timestamp {
            Some(ts) => {
                calendar.validate(&ts)?;
                ts
            }
            None => {
                let epoch = calendar.from_minutes(0)?;
                store.save_timestamp(&epoch).await?;
                epoch
            }
        };

        let triggers = TriggerStore::new();
        triggers.restore(&calendar, persisted.triggers);

        info!(
            timestamp = %current,
            pending_triggers = triggers.pending_count(),
            "Clock authority started"
        );

        Ok(Self {
            inner: std::sync::Arc::new(AuthorityInner {
                calendar,
                bus,
                triggers,
                store,
                current: RwLock::new(current),
                advance_gate: Mutex::new(()),
                scan_horizon_minutes: config.scan_horizon_minutes,
            }),
        })
    }

    /// The calendar this authority derives categories from.
    pub fn calendar(&self) -> &Calendar {
        &self.inner.calendar
    }

    /// The bus this authority publishes on.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// The persistence boundary, for embedders that share it.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// The current timestamp. Never blocks behind an in-flight advance.
    pub fn current(&self) -> WorldTimestamp {
        *self
            .inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The season of the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Calendar`] if derivation fails.
    pub fn season(&self) -> Result<Season, AuthorityError> {
        Ok(self.inner.calendar.season_of(&self.current())?)
    }

    /// The time-of-day block of the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Calendar`] if derivation fails.
    pub fn time_block(&self) -> Result<TimeBlock, AuthorityError> {
        Ok(self.inner.calendar.time_block_of(&self.current())?)
    }

    /// Number of pending triggers in the scheduled event store.
    pub fn pending_triggers(&self) -> u64 {
        self.inner.triggers.pending_count()
    }

    /// Advance world time by `minutes`.
    ///
    /// Concurrent callers are serialized in arrival order. Returns the new
    /// timestamp after all notifications for this advance have been
    /// delivered.
    ///
    /// # Errors
    ///
    /// - [`AuthorityError::ZeroMinutes`] for a zero delta.
    /// - [`AuthorityError::ReentrantAdvance`] when called from inside a
    ///   notification handler; the advance never executes.
    /// - [`AuthorityError::Store`] when persistence fails; state remains
    ///   at the previous timestamp and nothing is published.
    pub async fn advance(&self, minutes: u64) -> Result<WorldTimestamp, AuthorityError> {
        if minutes == 0 {
            return Err(AuthorityError::ZeroMinutes);
        }
        if self.inner.bus.in_delivery() {
            return Err(AuthorityError::ReentrantAdvance);
        }

        let _gate = self.inner.advance_gate.lock().await;

        let previous = self.current();
        let current = self.inner.calendar.add_minutes(&previous, minutes)?;

        let previous_season = self.inner.calendar.season_of(&previous)?;
        let current_season = self.inner.calendar.season_of(&current)?;
        let previous_block = self.inner.calendar.time_block_of(&previous)?;
        let current_block = self.inner.calendar.time_block_of(&current)?;

        let as_of = self.inner.calendar.to_minutes(&current)?;
        let plan = self.inner.triggers.plan_due(&self.inner.calendar, as_of)?;

        // Persist before anything becomes observable.
        self.inner
            .store
            .persist_advance(&current, &plan.removals, &plan.reschedules)
            .await?;

        self.inner.triggers.commit_due(&self.inner.calendar, &plan);
        {
            let mut slot = self
                .inner
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *slot = current;
        }

        debug!(
            minutes,
            %previous,
            %current,
            season_changed = previous_season != current_season,
            block_changed = previous_block != current_block,
            fired = plan.firings.len(),
            "Advance persisted, publishing"
        );

        // Season before time-block: season changes are the coarser category.
        if previous_season != current_season {
            self.inner.bus.publish(&Notification::CategoryChanged {
                timestamp: current,
                change: CategoryChange::Season {
                    previous: previous_season,
                    current: current_season,
                },
            })?;
        }
        if previous_block != current_block {
            self.inner.bus.publish(&Notification::CategoryChanged {
                timestamp: current,
                change: CategoryChange::TimeBlock {
                    previous: previous_block,
                    current: current_block,
                },
            })?;
        }

        for firing in &plan.firings {
            self.inner.bus.publish(&Notification::TriggerFired {
                timestamp: current,
                trigger_id: firing.trigger_id,
                target: firing.target,
                payload: firing.payload.clone(),
                owner: firing.owner.clone(),
            })?;
        }

        self.inner.bus.publish(&Notification::TimeProgressed {
            previous,
            current,
            minutes,
        })?;

        info!(minutes, %current, fired = plan.firings.len(), "Time advanced");
        Ok(current)
    }

    /// Register a trigger to fire when the clock reaches `target`.
    ///
    /// Targets at or before the current timestamp are accepted and fire on
    /// the very next advance. The trigger record is persisted before it
    /// becomes cancellable.
    ///
    /// # Errors
    ///
    /// - [`AuthorityError::Schedule`] for unreachable targets or a zero
    ///   recurrence interval.
    /// - [`AuthorityError::Store`] if persisting the record fails; the
    ///   trigger is not registered.
    pub async fn schedule(
        &self,
        target: WorldTimestamp,
        payload: Value,
        owner: Option<String>,
        recurrence: Option<u64>,
    ) -> Result<TriggerId, AuthorityError> {
        if recurrence == Some(0) {
            return Err(ScheduleError::ZeroRecurrence.into());
        }
        self.inner
            .calendar
            .to_minutes(&target)
            .map_err(ScheduleError::from)?;

        let trigger = ScheduledTrigger {
            id: TriggerId::new(),
            target,
            payload,
            owner,
            recurrence,
            created_at: Utc::now(),
        };

        self.inner.store.upsert_trigger(&trigger).await?;
        let id = self
            .inner
            .triggers
            .schedule(&self.inner.calendar, trigger)?;
        debug!(trigger_id = %id, %target, recurring = recurrence.is_some(), "Trigger registered");
        Ok(id)
    }

    /// Cancel a pending trigger.
    ///
    /// Returns `Ok(false)` for unknown or already-fired ids -- a no-op,
    /// not a fault. On persistence failure the in-memory registration is
    /// restored, so the store and the registry stay consistent.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Store`] if deleting the record fails.
    pub async fn cancel(&self, id: TriggerId) -> Result<bool, AuthorityError> {
        let Some(removed) = self.inner.triggers.cancel(id) else {
            return Ok(false);
        };
        if let Err(err) = self.inner.store.delete_trigger(id).await {
            self.inner.triggers.restore(&self.inner.calendar, vec![removed]);
            return Err(err.into());
        }
        Ok(true)
    }

    /// Minutes until the next timestamp satisfying `predicate`, scanning
    /// forward through the calendar from the current timestamp (inclusive:
    /// a predicate already satisfied now returns 0).
    ///
    /// Never mutates state.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::HorizonExceeded`] if the predicate is not
    /// satisfied within the configured scan horizon.
    pub fn minutes_until(
        &self,
        predicate: impl Fn(&WorldTimestamp) -> bool,
    ) -> Result<u64, AuthorityError> {
        let start = self.inner.calendar.to_minutes(&self.current())?;
        let horizon = self.inner.scan_horizon_minutes;

        for delta in 0..=horizon {
            let abs = start.checked_add(delta).ok_or(CalendarError::Overflow)?;
            let candidate = self.inner.calendar.from_minutes(abs)?;
            if predicate(&candidate) {
                return Ok(delta);
            }
        }
        Err(AuthorityError::HorizonExceeded {
            horizon_minutes: horizon,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::task::{Context, Poll, Waker};

    use sundial_types::NotificationKind;

    use super::*;
    use crate::config::CalendarSpec;
    use crate::store::MemoryTimeStore;

    async fn authority() -> TimeAuthority<MemoryTimeStore> {
        let calendar = Calendar::new(&CalendarSpec::default()).unwrap();
        TimeAuthority::start(
            calendar,
            &SchedulerConfig::default(),
            EventBus::new(),
            MemoryTimeStore::new(),
        )
        .await
        .unwrap()
    }

    fn collect_kinds(auth: &TimeAuthority<MemoryTimeStore>) -> Arc<StdMutex<Vec<NotificationKind>>> {
        let kinds = Arc::new(StdMutex::new(Vec::new()));
        let captured = Arc::clone(&kinds);
        auth.bus().on_wildcard(move |n| {
            captured.lock().unwrap().push(n.kind());
        });
        kinds
    }

    #[tokio::test]
    async fn starts_at_epoch_and_persists_it() {
        let auth = authority().await;
        assert_eq!(auth.current(), WorldTimestamp::from_fields(1, 1, 1, 0, 0));
        assert_eq!(
            auth.store().persisted_timestamp(),
            Some(WorldTimestamp::from_fields(1, 1, 1, 0, 0))
        );
    }

    #[tokio::test]
    async fn advance_accumulates_calendar_normalized_minutes() {
        let auth = authority().await;
        auth.advance(30).await.unwrap();
        auth.advance(45).await.unwrap();
        auth.advance(1440).await.unwrap();

        // 30 + 45 + 1440 minutes past epoch = day 2, 01:15.
        assert_eq!(auth.current(), WorldTimestamp::from_fields(1, 1, 2, 1, 15));
        let abs = auth.calendar().to_minutes(&auth.current()).unwrap();
        assert_eq!(abs, 30 + 45 + 1440);
    }

    #[tokio::test]
    async fn zero_minutes_is_rejected() {
        let auth = authority().await;
        assert!(matches!(
            auth.advance(0).await,
            Err(AuthorityError::ZeroMinutes)
        ));
    }

    #[tokio::test]
    async fn season_boundary_crossing_orders_notifications() {
        let calendar = Calendar::new(&CalendarSpec::default()).unwrap();
        let store = MemoryTimeStore::new();
        // One hour before the month-2 -> month-3 boundary, which is the
        // Winter -> Spring season boundary.
        store
            .save_timestamp(&WorldTimestamp::from_fields(1, 2, 30, 23, 0))
            .await
            .unwrap();
        let auth = TimeAuthority::start(
            calendar,
            &SchedulerConfig::default(),
            EventBus::new(),
            store,
        )
        .await
        .unwrap();

        assert_eq!(auth.season().unwrap(), Season::Winter);

        let changes = Arc::new(StdMutex::new(Vec::new()));
        let captured = Arc::clone(&changes);
        auth.bus().on_wildcard(move |n| {
            captured.lock().unwrap().push(n.clone());
        });

        let result = auth.advance(120).await.unwrap();
        assert_eq!(result, WorldTimestamp::from_fields(1, 3, 1, 1, 0));
        assert_eq!(auth.season().unwrap(), Season::Spring);

        let seen = changes.lock().unwrap();
        // 23:00 and 01:00 are both Night under the default block table, so
        // the only category change is the season.
        assert_eq!(seen.len(), 2);
        assert!(matches!(
            seen.first(),
            Some(Notification::CategoryChanged {
                change: CategoryChange::Season {
                    previous: Season::Winter,
                    current: Season::Spring,
                },
                ..
            })
        ));
        assert!(matches!(
            seen.get(1),
            Some(Notification::TimeProgressed { minutes: 120, .. })
        ));
    }

    #[tokio::test]
    async fn no_category_notifications_without_crossing() {
        let auth = authority().await;
        let changes = collect_kinds(&auth);

        // 00:00 to 00:30, same Night block, same Winter season.
        auth.advance(30).await.unwrap();

        let seen = changes.lock().unwrap();
        assert_eq!(seen.as_slice(), &[NotificationKind::TimeProgressed]);
    }

    #[tokio::test]
    async fn trigger_fires_on_exactly_the_crossing_advance() {
        let auth = authority().await;
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        auth.bus().on(NotificationKind::TriggerFired, move |_n| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // +90 minutes from now, then three 30-minute advances: the trigger
        // fires on the third, not the first or second.
        let target = auth.calendar().add_minutes(&auth.current(), 90).unwrap();
        auth.schedule(target, Value::Null, None, None).await.unwrap();

        auth.advance(30).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        auth.advance(30).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        auth.advance(30).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // One-shot: never again.
        auth.advance(1440).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recurring_trigger_fires_once_per_crossing() {
        let auth = authority().await;
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        auth.bus().on(NotificationKind::TriggerFired, move |_n| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let target = auth.calendar().add_minutes(&auth.current(), 60).unwrap();
        auth.schedule(target, Value::Null, None, Some(60)).await.unwrap();

        for expected in 1..=5 {
            auth.advance(60).await.unwrap();
            assert_eq!(fired.load(Ordering::SeqCst), expected);
        }
    }

    #[tokio::test]
    async fn past_dated_trigger_fires_on_next_advance() {
        let auth = authority().await;
        auth.advance(600).await.unwrap();

        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        auth.bus().on(NotificationKind::TriggerFired, move |_n| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Strictly in the past at creation time.
        let past = WorldTimestamp::from_fields(1, 1, 1, 2, 0);
        auth.schedule(past, Value::Null, None, None).await.unwrap();

        auth.advance(1).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistence_failure_aborts_advance_atomically() {
        let auth = authority().await;
        let kinds = collect_kinds(&auth);

        let target = auth.calendar().add_minutes(&auth.current(), 10).unwrap();
        auth.schedule(target, Value::Null, None, None).await.unwrap();

        auth.store().fail_next_persist();
        let result = auth.advance(30).await;
        assert!(matches!(result, Err(AuthorityError::Store { .. })));

        // Nothing observable happened: timestamp, triggers, notifications.
        assert_eq!(auth.current(), WorldTimestamp::from_fields(1, 1, 1, 0, 0));
        assert_eq!(auth.pending_triggers(), 1);
        assert!(kinds.lock().unwrap().is_empty());

        // The same advance succeeds afterwards and fires the trigger.
        auth.advance(30).await.unwrap();
        assert_eq!(auth.current(), WorldTimestamp::from_fields(1, 1, 1, 0, 30));
        assert_eq!(auth.pending_triggers(), 0);
    }

    #[tokio::test]
    async fn reentrant_advance_is_rejected() {
        let auth = authority().await;
        let observed = Arc::new(StdMutex::new(None));

        let reentrant = auth.clone();
        let captured = Arc::clone(&observed);
        auth.bus().on_wildcard(move |_n| {
            // A handler cannot await; polling the future once is enough to
            // reach the reentrancy check, which trips before any await.
            let mut fut = Box::pin(reentrant.advance(10));
            let waker = Waker::noop();
            let mut cx = Context::from_waker(waker);
            let poll = fut.as_mut().poll(&mut cx);
            *captured.lock().unwrap() = Some(matches!(
                poll,
                Poll::Ready(Err(AuthorityError::ReentrantAdvance))
            ));
        });

        auth.advance(5).await.unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(true));
        // The clock only moved by the outer advance.
        assert_eq!(auth.current(), WorldTimestamp::from_fields(1, 1, 1, 0, 5));
    }

    #[tokio::test]
    async fn cancel_unknown_id_is_a_noop() {
        let auth = authority().await;
        assert!(!auth.cancel(TriggerId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_then_advance_fires_nothing() {
        let auth = authority().await;
        let kinds = collect_kinds(&auth);

        let target = auth.calendar().add_minutes(&auth.current(), 30).unwrap();
        let id = auth.schedule(target, Value::Null, None, None).await.unwrap();
        assert!(auth.cancel(id).await.unwrap());
        assert_eq!(auth.store().persisted_trigger_count(), 0);

        auth.advance(60).await.unwrap();
        assert_eq!(
            kinds.lock().unwrap().as_slice(),
            &[NotificationKind::TimeProgressed]
        );
    }

    #[tokio::test]
    async fn unreachable_schedule_target_is_a_value_error() {
        let auth = authority().await;
        let bogus = WorldTimestamp::from_fields(1, 13, 1, 0, 0);
        let result = auth.schedule(bogus, Value::Null, None, None).await;
        assert!(matches!(result, Err(AuthorityError::Schedule { .. })));
    }

    #[tokio::test]
    async fn minutes_until_scans_the_calendar() {
        let auth = authority().await;
        // From 00:00, dawn (hour 5) is 300 minutes away.
        let minutes = auth
            .minutes_until(|ts| ts.hour == 5 && ts.minute == 0)
            .unwrap();
        assert_eq!(minutes, 300);

        // Already satisfied now: zero wait.
        let minutes = auth.minutes_until(|ts| ts.hour == 0).unwrap();
        assert_eq!(minutes, 0);

        // State untouched by scanning.
        assert_eq!(auth.current(), WorldTimestamp::from_fields(1, 1, 1, 0, 0));
    }

    #[tokio::test]
    async fn minutes_until_respects_horizon() {
        let calendar = Calendar::new(&CalendarSpec::default()).unwrap();
        let config = SchedulerConfig {
            scan_horizon_minutes: 100,
        };
        let auth = TimeAuthority::start(
            calendar,
            &config,
            EventBus::new(),
            MemoryTimeStore::new(),
        )
        .await
        .unwrap();

        let result = auth.minutes_until(|ts| ts.hour == 12);
        assert!(matches!(
            result,
            Err(AuthorityError::HorizonExceeded {
                horizon_minutes: 100
            })
        ));
    }

    #[tokio::test]
    async fn restored_state_survives_restart() {
        let calendar = Calendar::new(&CalendarSpec::default()).unwrap();

        let auth = authority().await;
        auth.advance(720).await.unwrap();
        let target = auth.calendar().add_minutes(&auth.current(), 60).unwrap();
        auth.schedule(target, Value::Null, None, None).await.unwrap();

        // Carry the persisted world into a fresh store, as a restart would.
        let world = auth.store().load().await.unwrap();
        let carried = MemoryTimeStore::new();
        if let Some(ts) = world.timestamp {
            carried.save_timestamp(&ts).await.unwrap();
        }
        for trigger in &world.triggers {
            carried.upsert_trigger(trigger).await.unwrap();
        }

        let restarted = TimeAuthority::start(
            calendar,
            &SchedulerConfig::default(),
            EventBus::new(),
            carried,
        )
        .await
        .unwrap();

        assert_eq!(
            restarted.current(),
            WorldTimestamp::from_fields(1, 1, 1, 12, 0)
        );
        assert_eq!(restarted.pending_triggers(), 1);

        // The restored trigger fires when its target is crossed.
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        restarted.bus().on(NotificationKind::TriggerFired, move |_n| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        restarted.advance(60).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
