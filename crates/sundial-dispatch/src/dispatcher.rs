//! The dispatcher: worker pool, retry policy, and idempotent completion.
//!
//! Submissions are queued on an unbounded channel and drained by a fixed
//! pool of tokio workers. Each attempt runs under a wall-clock budget;
//! transient failures and timeouts are retried with exponential backoff
//! plus jitter up to a retry ceiling, after which the item fails
//! permanently and a `WorkFailed` notification is published on the event
//! bus -- subsystems observe async failure through the same path as every
//! other transition.
//!
//! Execution is at-least-once. The first completion to apply under an
//! idempotency key wins; later completions with the same key terminate as
//! [`WorkOutcome::Superseded`] and their result is discarded.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::Value;
use sundial_core::bus::EventBus;
use sundial_core::config::DispatchConfig;
use sundial_types::{IdempotencyKey, Notification, WorkId, WorkItem, WorkOutcome, WorkStatus};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, WorkError};

/// A submission: the semantic key plus the opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkRequest {
    /// Stable key over the semantic request (see [`IdempotencyKey`]).
    pub idempotency_key: IdempotencyKey,
    /// Opaque payload handed to the executor.
    pub payload: Value,
}

impl WorkRequest {
    /// Build a request.
    pub const fn new(idempotency_key: IdempotencyKey, payload: Value) -> Self {
        Self {
            idempotency_key,
            payload,
        }
    }
}

/// The computation seam: the dispatcher owns scheduling and retries, the
/// executor owns the actual work.
pub trait WorkExecutor: Send + Sync + 'static {
    /// Execute one attempt. Return [`WorkError::Transient`] to request a
    /// retry, [`WorkError::Permanent`] to fail the item immediately.
    fn execute(
        &self,
        payload: &Value,
    ) -> impl Future<Output = Result<Value, WorkError>> + Send;
}

/// Point-in-time dispatcher counters for the status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatcherStats {
    /// Items accepted but not yet picked up by a worker.
    pub queue_depth: u64,
    /// Items currently executing.
    pub in_flight: u64,
    /// Items that reached `Done` (including superseded completions).
    pub completed: u64,
    /// Items that failed permanently.
    pub failed: u64,
}

/// Callback invoked exactly once with an item's terminal outcome.
type CompletionCallback = Box<dyn FnOnce(&WorkOutcome) + Send>;

/// One tracked work item.
struct WorkRecord {
    item: WorkItem,
    cancelled: bool,
    outcome: Option<WorkOutcome>,
    callbacks: Vec<CompletionCallback>,
}

impl core::fmt::Debug for WorkRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkRecord")
            .field("item", &self.item)
            .field("cancelled", &self.cancelled)
            .field("outcome", &self.outcome)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Shared dispatcher state.
#[derive(Debug)]
struct DispatcherInner {
    config: DispatchConfig,
    bus: EventBus,
    records: StdMutex<HashMap<WorkId, WorkRecord>>,
    applied: StdMutex<HashSet<IdempotencyKey>>,
    queue_tx: StdMutex<Option<mpsc::UnboundedSender<WorkId>>>,
    queue_depth: AtomicU64,
    in_flight: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Handle to the async work dispatcher.
///
/// Cheap to clone; clones share the pool and all tracked items. Must be
/// created inside a tokio runtime (workers are spawned immediately).
#[derive(Debug)]
pub struct Dispatcher<E> {
    inner: Arc<DispatcherInner>,
    executor: Arc<E>,
}

impl<E> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl<E: WorkExecutor> Dispatcher<E> {
    /// Start the worker pool and return a handle.
    pub fn start(config: DispatchConfig, executor: E, bus: EventBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(DispatcherInner {
            config,
            bus,
            records: StdMutex::new(HashMap::new()),
            applied: StdMutex::new(HashSet::new()),
            queue_tx: StdMutex::new(Some(tx)),
            queue_depth: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });
        let executor = Arc::new(executor);

        let worker_count = config.workers.max(1);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker_id in 0..worker_count {
            let inner = Arc::clone(&inner);
            let executor = Arc::clone(&executor);
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                worker_loop(inner, executor, rx, worker_id).await;
            });
        }

        info!(workers = worker_count, "Dispatcher started");
        Self { inner, executor }
    }

    /// Accept a work item for execution.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShutDown`] after [`shutdown`](Self::shutdown).
    pub fn submit(&self, request: WorkRequest) -> Result<WorkId, DispatchError> {
        let id = WorkId::new();
        let item = WorkItem {
            id,
            idempotency_key: request.idempotency_key,
            payload: request.payload,
            status: WorkStatus::Queued,
            attempts: 0,
            submitted_at: Utc::now(),
        };

        {
            let mut records = self
                .inner
                .records
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            records.insert(
                id,
                WorkRecord {
                    item,
                    cancelled: false,
                    outcome: None,
                    callbacks: Vec::new(),
                },
            );
        }

        // Count the item before it is visible to workers; a worker may
        // dequeue (and decrement) the instant the send lands.
        self.inner.queue_depth.fetch_add(1, Ordering::SeqCst);
        let sent = {
            let guard = self
                .inner
                .queue_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.as_ref().map(|tx| tx.send(id).is_ok())
        };

        match sent {
            Some(true) => {
                debug!(work_id = %id, "Work item queued");
                Ok(id)
            }
            _ => {
                self.inner.queue_depth.fetch_sub(1, Ordering::SeqCst);
                let mut records = self
                    .inner
                    .records
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                records.remove(&id);
                Err(DispatchError::ShutDown)
            }
        }
    }

    /// Current status of an item, or `None` for unknown ids.
    pub fn status(&self, id: WorkId) -> Option<WorkStatus> {
        let records = self
            .inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        records.get(&id).map(|record| record.item.status)
    }

    /// Snapshot of an item, or `None` for unknown ids.
    pub fn item(&self, id: WorkId) -> Option<WorkItem> {
        let records = self
            .inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        records.get(&id).map(|record| record.item.clone())
    }

    /// Register a callback for an item's terminal outcome.
    ///
    /// Fires immediately if the item is already terminal, otherwise when
    /// it becomes terminal. Returns `false` for unknown ids.
    pub fn on_complete(
        &self,
        id: WorkId,
        callback: impl FnOnce(&WorkOutcome) + Send + 'static,
    ) -> bool {
        let immediate = {
            let mut records = self
                .inner
                .records
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(record) = records.get_mut(&id) else {
                return false;
            };
            match &record.outcome {
                Some(outcome) => Some(outcome.clone()),
                None => {
                    record.callbacks.push(Box::new(callback));
                    return true;
                }
            }
        };
        if let Some(outcome) = immediate {
            callback(&outcome);
        }
        true
    }

    /// Mark an item cancelled.
    ///
    /// A worker already executing it is not interrupted; cancellation only
    /// suppresses result application. Returns `false` for unknown or
    /// already-terminal ids.
    pub fn cancel(&self, id: WorkId) -> bool {
        let mut records = self
            .inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(&id) {
            Some(record) if !record.item.status.is_terminal() => {
                record.cancelled = true;
                debug!(work_id = %id, "Work item cancelled");
                true
            }
            _ => false,
        }
    }

    /// Current counters for the status surface.
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            queue_depth: self.inner.queue_depth.load(Ordering::SeqCst),
            in_flight: self.inner.in_flight.load(Ordering::SeqCst),
            completed: self.inner.completed.load(Ordering::SeqCst),
            failed: self.inner.failed.load(Ordering::SeqCst),
        }
    }

    /// Stop accepting work. Workers drain the queue and exit.
    pub fn shutdown(&self) {
        let mut guard = self
            .inner
            .queue_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.take();
        info!("Dispatcher shut down");
    }
}

/// Worker: drain the queue until the channel closes.
async fn worker_loop<E: WorkExecutor>(
    inner: Arc<DispatcherInner>,
    executor: Arc<E>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<WorkId>>>,
    worker_id: u32,
) {
    debug!(worker_id, "Worker started");
    loop {
        let next = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(id) = next else {
            break;
        };
        run_one(&inner, executor.as_ref(), id).await;
    }
    debug!(worker_id, "Worker stopped");
}

/// Execute one item through the full attempt/retry lifecycle.
async fn run_one<E: WorkExecutor>(inner: &Arc<DispatcherInner>, executor: &E, id: WorkId) {
    inner.queue_depth.fetch_sub(1, Ordering::SeqCst);

    // Snapshot what the attempt loop needs; drop the guard before awaiting.
    let (payload, key, cancelled) = {
        let mut records = inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(record) = records.get_mut(&id) else {
            return;
        };
        if record.cancelled {
            (Value::Null, record.item.idempotency_key.clone(), true)
        } else {
            record.item.status = WorkStatus::Running;
            (
                record.item.payload.clone(),
                record.item.idempotency_key.clone(),
                false,
            )
        }
    };

    if cancelled {
        finish(inner, id, WorkStatus::Cancelled, &WorkOutcome::Cancelled);
        return;
    }

    inner.in_flight.fetch_add(1, Ordering::SeqCst);

    let max_attempts = inner.config.retry_ceiling.saturating_add(1);
    let budget = Duration::from_millis(inner.config.attempt_timeout_ms);
    let mut attempt: u32 = 0;

    let result = loop {
        attempt = attempt.saturating_add(1);
        {
            let mut records = inner
                .records
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(record) = records.get_mut(&id) {
                record.item.attempts = attempt;
            }
        }

        let transient_reason = match timeout(budget, executor.execute(&payload)).await {
            Ok(Ok(value)) => break Ok(value),
            Ok(Err(WorkError::Permanent { message })) => break Err(message),
            Ok(Err(WorkError::Transient { message })) => message,
            Err(_elapsed) => format!(
                "attempt exceeded wall-clock budget of {}ms",
                inner.config.attempt_timeout_ms
            ),
        };

        if attempt >= max_attempts {
            break Err(format!(
                "retry ceiling reached after {attempt} attempts; last failure: {transient_reason}"
            ));
        }

        let delay = backoff_delay(&inner.config, attempt);
        warn!(
            work_id = %id,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            reason = %transient_reason,
            "Transient work failure, backing off"
        );
        tokio::time::sleep(delay).await;
    };

    inner.in_flight.fetch_sub(1, Ordering::SeqCst);

    match result {
        Ok(value) => {
            let cancelled = {
                let records = inner
                    .records
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                records.get(&id).is_some_and(|record| record.cancelled)
            };
            if cancelled {
                finish(inner, id, WorkStatus::Cancelled, &WorkOutcome::Cancelled);
                return;
            }

            let first_application = {
                let mut applied = inner
                    .applied
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                applied.insert(key.clone())
            };

            inner.completed.fetch_add(1, Ordering::SeqCst);
            if first_application {
                debug!(work_id = %id, key = %key, "Work completed, result applied");
                finish(inner, id, WorkStatus::Done, &WorkOutcome::Completed(value));
            } else {
                debug!(work_id = %id, key = %key, "Duplicate completion, result discarded");
                finish(inner, id, WorkStatus::Done, &WorkOutcome::Superseded);
            }
        }
        Err(error) => {
            inner.failed.fetch_add(1, Ordering::SeqCst);
            warn!(work_id = %id, error = %error, "Work failed permanently");
            finish(
                inner,
                id,
                WorkStatus::Failed,
                &WorkOutcome::Failed(error.clone()),
            );
            let notification = Notification::WorkFailed {
                work_id: id,
                idempotency_key: key,
                error,
            };
            if let Err(err) = inner.bus.publish(&notification) {
                warn!(work_id = %id, error = %err, "Failed to publish work failure");
            }
        }
    }
}

/// Record a terminal outcome and fire pending callbacks outside the lock.
fn finish(inner: &DispatcherInner, id: WorkId, status: WorkStatus, outcome: &WorkOutcome) {
    let callbacks = {
        let mut records = inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(record) = records.get_mut(&id) else {
            return;
        };
        record.item.status = status;
        record.outcome = Some(outcome.clone());
        std::mem::take(&mut record.callbacks)
    };
    for callback in callbacks {
        callback(outcome);
    }
}

/// Exponential backoff with jitter: `initial * multiplier^(attempt-1)`,
/// capped at the configured maximum.
fn backoff_delay(config: &DispatchConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = u64::from(config.backoff_multiplier)
        .checked_pow(exponent)
        .unwrap_or(u64::MAX);
    let base = config
        .backoff_initial_ms
        .saturating_mul(factor)
        .min(config.backoff_max_ms);
    let jitter = if config.backoff_jitter_ms == 0 {
        0
    } else {
        let mut rng = rand::rng();
        rng.random_range(0..=config.backoff_jitter_ms)
    };
    Duration::from_millis(base.saturating_add(jitter))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::sync::Mutex;

    use super::*;

    /// Test executor scripted by its fields: fail the first N attempts
    /// with a transient error, optionally fail permanently, optionally
    /// stall until released, optionally sleep past the attempt budget.
    struct ScriptedExecutor {
        calls: AtomicU32,
        transient_failures: u32,
        permanent: bool,
        hold: Option<Arc<AtomicBool>>,
        sleep_ms: u64,
    }

    impl Default for ScriptedExecutor {
        fn default() -> Self {
            Self {
                calls: AtomicU32::new(0),
                transient_failures: 0,
                permanent: false,
                hold: None,
                sleep_ms: 0,
            }
        }
    }

    impl WorkExecutor for ScriptedExecutor {
        async fn execute(&self, payload: &Value) -> Result<Value, WorkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);

            if self.sleep_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.sleep_ms)).await;
            }
            if let Some(hold) = &self.hold {
                // Only the first submission stalls; the release flag is
                // observed via polling to keep the executor trivially Send.
                if payload.get("hold").is_some() {
                    while !hold.load(Ordering::SeqCst) {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                }
            }
            if self.permanent {
                return Err(WorkError::permanent("scripted permanent failure"));
            }
            if call < self.transient_failures {
                return Err(WorkError::transient("scripted transient failure"));
            }
            Ok(serde_json::json!({ "echo": payload, "call": call }))
        }
    }

    fn test_config() -> DispatchConfig {
        DispatchConfig {
            workers: 2,
            retry_ceiling: 2,
            attempt_timeout_ms: 200,
            backoff_initial_ms: 5,
            backoff_multiplier: 2,
            backoff_max_ms: 20,
            backoff_jitter_ms: 0,
        }
    }

    async fn outcome_of<E: WorkExecutor>(
        dispatcher: &Dispatcher<E>,
        id: WorkId,
    ) -> WorkOutcome {
        let (tx, rx) = tokio::sync::oneshot::channel();
        assert!(dispatcher.on_complete(id, move |outcome| {
            let _ = tx.send(outcome.clone());
        }));
        rx.await.unwrap()
    }

    fn request(key: &str, payload: Value) -> WorkRequest {
        WorkRequest::new(IdempotencyKey::new(key), payload)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn executes_and_completes() {
        let dispatcher = Dispatcher::start(
            test_config(),
            ScriptedExecutor::default(),
            EventBus::new(),
        );

        let id = dispatcher
            .submit(request("job:1", serde_json::json!({"region": 3})))
            .unwrap();
        let outcome = outcome_of(&dispatcher, id).await;

        assert!(matches!(outcome, WorkOutcome::Completed(_)));
        assert_eq!(dispatcher.status(id), Some(WorkStatus::Done));
        assert_eq!(dispatcher.item(id).unwrap().attempts, 1);
        assert_eq!(dispatcher.stats().completed, 1);
        assert_eq!(dispatcher.stats().failed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transient_failures_are_retried() {
        let executor = ScriptedExecutor {
            transient_failures: 2,
            ..ScriptedExecutor::default()
        };
        let dispatcher = Dispatcher::start(test_config(), executor, EventBus::new());

        let id = dispatcher
            .submit(request("job:retry", Value::Null))
            .unwrap();
        let outcome = outcome_of(&dispatcher, id).await;

        // Two transient failures, then success on the third attempt.
        assert!(matches!(outcome, WorkOutcome::Completed(_)));
        assert_eq!(dispatcher.item(id).unwrap().attempts, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn retry_ceiling_surfaces_a_failure_notification() {
        let bus = EventBus::new();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&failures);
        bus.on(sundial_types::NotificationKind::WorkFailed, move |n| {
            captured.lock().unwrap().push(n.clone());
        });

        let executor = ScriptedExecutor {
            transient_failures: u32::MAX,
            ..ScriptedExecutor::default()
        };
        let dispatcher = Dispatcher::start(test_config(), executor, bus);

        let id = dispatcher
            .submit(request("job:doomed", Value::Null))
            .unwrap();
        let outcome = outcome_of(&dispatcher, id).await;

        assert!(matches!(outcome, WorkOutcome::Failed(_)));
        assert_eq!(dispatcher.status(id), Some(WorkStatus::Failed));
        // retry_ceiling = 2 means 3 attempts total.
        assert_eq!(dispatcher.item(id).unwrap().attempts, 3);
        assert_eq!(dispatcher.stats().failed, 1);

        let seen = failures.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            seen.first(),
            Some(Notification::WorkFailed { work_id, .. }) if *work_id == id
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn permanent_failure_skips_retries() {
        let executor = ScriptedExecutor {
            permanent: true,
            ..ScriptedExecutor::default()
        };
        let dispatcher = Dispatcher::start(test_config(), executor, EventBus::new());

        let id = dispatcher
            .submit(request("job:bad", Value::Null))
            .unwrap();
        let outcome = outcome_of(&dispatcher, id).await;

        assert!(matches!(outcome, WorkOutcome::Failed(_)));
        assert_eq!(dispatcher.item(id).unwrap().attempts, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn attempt_timeout_counts_as_transient() {
        let executor = ScriptedExecutor {
            sleep_ms: 500,
            ..ScriptedExecutor::default()
        };
        let config = DispatchConfig {
            attempt_timeout_ms: 40,
            retry_ceiling: 1,
            ..test_config()
        };
        let dispatcher = Dispatcher::start(config, executor, EventBus::new());

        let id = dispatcher
            .submit(request("job:slow", Value::Null))
            .unwrap();
        let outcome = outcome_of(&dispatcher, id).await;

        assert!(matches!(outcome, WorkOutcome::Failed(_)));
        assert_eq!(dispatcher.item(id).unwrap().attempts, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn duplicate_key_out_of_order_applies_first_arrival_only() {
        let release = Arc::new(AtomicBool::new(false));
        let executor = ScriptedExecutor {
            hold: Some(Arc::clone(&release)),
            ..ScriptedExecutor::default()
        };
        let dispatcher = Dispatcher::start(test_config(), executor, EventBus::new());

        // Submitted first, completes last.
        let held = dispatcher
            .submit(request("poi:ruins:7", serde_json::json!({"hold": true})))
            .unwrap();
        // Submitted second, completes first.
        let quick = dispatcher
            .submit(request("poi:ruins:7", serde_json::json!({"fast": true})))
            .unwrap();

        let quick_outcome = outcome_of(&dispatcher, quick).await;
        assert!(matches!(quick_outcome, WorkOutcome::Completed(_)));

        release.store(true, Ordering::SeqCst);
        let held_outcome = outcome_of(&dispatcher, held).await;

        // The late completion is a no-op: its result is discarded.
        assert_eq!(held_outcome, WorkOutcome::Superseded);
        assert_eq!(dispatcher.status(held), Some(WorkStatus::Done));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_suppresses_application() {
        let release = Arc::new(AtomicBool::new(false));
        let executor = ScriptedExecutor {
            hold: Some(Arc::clone(&release)),
            ..ScriptedExecutor::default()
        };
        let dispatcher = Dispatcher::start(test_config(), executor, EventBus::new());

        let id = dispatcher
            .submit(request("job:cancel", serde_json::json!({"hold": true})))
            .unwrap();

        // Let the worker pick it up, then cancel mid-execution.
        while dispatcher.status(id) != Some(WorkStatus::Running) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(dispatcher.cancel(id));
        release.store(true, Ordering::SeqCst);

        let outcome = outcome_of(&dispatcher, id).await;
        assert_eq!(outcome, WorkOutcome::Cancelled);
        assert_eq!(dispatcher.status(id), Some(WorkStatus::Cancelled));

        // Cancelling a terminal item is a no-op.
        assert!(!dispatcher.cancel(id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn on_complete_after_terminal_fires_immediately() {
        let dispatcher = Dispatcher::start(
            test_config(),
            ScriptedExecutor::default(),
            EventBus::new(),
        );

        let id = dispatcher
            .submit(request("job:late", Value::Null))
            .unwrap();
        let _ = outcome_of(&dispatcher, id).await;

        // The item is terminal; a late registration still observes it.
        let late = outcome_of(&dispatcher, id).await;
        assert!(matches!(late, WorkOutcome::Completed(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_rejects_new_work() {
        let dispatcher = Dispatcher::start(
            test_config(),
            ScriptedExecutor::default(),
            EventBus::new(),
        );
        dispatcher.shutdown();
        let result = dispatcher.submit(request("job:after", Value::Null));
        assert!(matches!(result, Err(DispatchError::ShutDown)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_ids_are_none() {
        let dispatcher = Dispatcher::start(
            test_config(),
            ScriptedExecutor::default(),
            EventBus::new(),
        );
        let ghost = WorkId::new();
        assert_eq!(dispatcher.status(ghost), None);
        assert!(!dispatcher.cancel(ghost));
        assert!(!dispatcher.on_complete(ghost, |_outcome| {}));
    }
}
