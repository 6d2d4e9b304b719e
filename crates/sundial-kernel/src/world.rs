//! The [`World`] composition root.
//!
//! Startup sequence:
//!
//! 1. Validate the calendar from configuration (fatal on malformed
//!    boundary tables).
//! 2. Create the event bus and attach the cache's eviction subscription.
//! 3. Start the clock authority, restoring the persisted timestamp and
//!    pending triggers through the store.
//! 4. Start the dispatcher's worker pool.
//!
//! The cache subscribes before the authority can publish, so no advance
//! can slip a notification past the eviction path.

use serde_json::Value;
use sundial_core::bus::EventBus;
use sundial_core::cache::WorldCache;
use sundial_core::calendar::Calendar;
use sundial_core::clock::{AuthorityError, TimeAuthority};
use sundial_core::config::KernelConfig;
use sundial_core::store::TimeStore;
use sundial_dispatch::{DispatchError, Dispatcher, WorkExecutor, WorkRequest};
use sundial_types::{
    CacheScope, Season, StatusReport, TimeBlock, TriggerId, WorkId, WorkOutcome, WorkStatus,
    WorldTimestamp,
};
use tracing::info;

use crate::relay::{NatsRelay, RelayError};

/// The assembled kernel: clock, bus, cache, and dispatcher behind one
/// handle.
///
/// Cheap to clone; clones share everything. Subsystem adapters receive a
/// clone (or just the bus) and register handlers with
/// [`on`](sundial_core::bus::EventBus::on) /
/// [`on_wildcard`](sundial_core::bus::EventBus::on_wildcard).
#[derive(Debug)]
pub struct World<S, E> {
    authority: TimeAuthority<S>,
    bus: EventBus,
    dispatcher: Dispatcher<E>,
    cache: WorldCache<Value>,
}

impl<S, E> Clone for World<S, E> {
    fn clone(&self) -> Self {
        Self {
            authority: self.authority.clone(),
            bus: self.bus.clone(),
            dispatcher: self.dispatcher.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<S: TimeStore, E: WorkExecutor> World<S, E> {
    /// Build and start the kernel.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Calendar`] for malformed calendar
    /// configuration and [`AuthorityError::Store`] if restoring persisted
    /// state fails. Both are startup-fatal by design.
    pub async fn start(
        config: &KernelConfig,
        store: S,
        executor: E,
    ) -> Result<Self, AuthorityError> {
        let calendar = Calendar::new(&config.calendar)?;
        let bus = EventBus::new();

        let cache = WorldCache::new();
        cache.attach(&bus);

        let authority =
            TimeAuthority::start(calendar, &config.scheduler, bus.clone(), store).await?;
        let dispatcher = Dispatcher::start(config.dispatch, executor, bus.clone());

        info!(timestamp = %authority.current(), "World started");
        Ok(Self {
            authority,
            bus,
            dispatcher,
            cache,
        })
    }

    /// The clock authority.
    pub const fn authority(&self) -> &TimeAuthority<S> {
        &self.authority
    }

    /// The event bus, for subsystem adapter registration.
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The async work dispatcher.
    pub const fn dispatcher(&self) -> &Dispatcher<E> {
        &self.dispatcher
    }

    /// The shared read cache.
    pub const fn cache(&self) -> &WorldCache<Value> {
        &self.cache
    }

    // -- Clock surface -----------------------------------------------------

    /// Advance world time. See [`TimeAuthority::advance`].
    ///
    /// # Errors
    ///
    /// Propagates [`AuthorityError`] from the authority.
    pub async fn advance(&self, minutes: u64) -> Result<WorldTimestamp, AuthorityError> {
        self.authority.advance(minutes).await
    }

    /// The current timestamp.
    pub fn current(&self) -> WorldTimestamp {
        self.authority.current()
    }

    /// The current season.
    ///
    /// # Errors
    ///
    /// Propagates [`AuthorityError::Calendar`].
    pub fn season(&self) -> Result<Season, AuthorityError> {
        self.authority.season()
    }

    /// The current time-of-day block.
    ///
    /// # Errors
    ///
    /// Propagates [`AuthorityError::Calendar`].
    pub fn time_block(&self) -> Result<TimeBlock, AuthorityError> {
        self.authority.time_block()
    }

    /// Minutes until the next timestamp satisfying `predicate`.
    ///
    /// # Errors
    ///
    /// Propagates [`AuthorityError::HorizonExceeded`].
    pub fn minutes_until(
        &self,
        predicate: impl Fn(&WorldTimestamp) -> bool,
    ) -> Result<u64, AuthorityError> {
        self.authority.minutes_until(predicate)
    }

    // -- Scheduling surface ------------------------------------------------

    /// Register a trigger. See [`TimeAuthority::schedule`].
    ///
    /// # Errors
    ///
    /// Propagates [`AuthorityError`] from the authority.
    pub async fn schedule(
        &self,
        target: WorldTimestamp,
        payload: Value,
        owner: Option<String>,
        recurrence: Option<u64>,
    ) -> Result<TriggerId, AuthorityError> {
        self.authority.schedule(target, payload, owner, recurrence).await
    }

    /// Cancel a pending trigger. See [`TimeAuthority::cancel`].
    ///
    /// # Errors
    ///
    /// Propagates [`AuthorityError::Store`].
    pub async fn cancel_trigger(&self, id: TriggerId) -> Result<bool, AuthorityError> {
        self.authority.cancel(id).await
    }

    // -- Async work surface ------------------------------------------------

    /// Submit an async work item.
    ///
    /// # Errors
    ///
    /// Propagates [`DispatchError::ShutDown`].
    pub fn submit_work(&self, request: WorkRequest) -> Result<WorkId, DispatchError> {
        self.dispatcher.submit(request)
    }

    /// Status of a work item.
    pub fn work_status(&self, id: WorkId) -> Option<WorkStatus> {
        self.dispatcher.status(id)
    }

    /// Register a completion callback for a work item.
    pub fn on_work_complete(
        &self,
        id: WorkId,
        callback: impl FnOnce(&WorkOutcome) + Send + 'static,
    ) -> bool {
        self.dispatcher.on_complete(id, callback)
    }

    /// Mark a work item cancelled.
    pub fn cancel_work(&self, id: WorkId) -> bool {
        self.dispatcher.cancel(id)
    }

    // -- Cache surface -----------------------------------------------------

    /// Read a cached view.
    pub fn cached(&self, key: &str) -> Option<Value> {
        self.cache.get(key)
    }

    /// Publish a cached view under an eviction scope.
    pub fn cache_put(&self, key: impl Into<String>, value: Value, scope: CacheScope) {
        self.cache.put(key, value, scope);
    }

    // -- Relay surface -----------------------------------------------------

    /// Mirror this world's notifications onto NATS `time.<kind>` subjects.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connect`] if the connection fails; the bus is
    /// left untouched.
    pub async fn attach_nats_relay(&self, url: &str) -> Result<NatsRelay, RelayError> {
        NatsRelay::attach(&self.bus, url).await
    }

    // -- Status surface ----------------------------------------------------

    /// Assemble the operational status snapshot.
    pub fn status(&self) -> StatusReport {
        let stats = self.dispatcher.stats();
        StatusReport {
            timestamp: self.authority.current(),
            pending_triggers: self.authority.pending_triggers(),
            queue_depth: stats.queue_depth,
            in_flight: stats.in_flight,
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
        }
    }
}
