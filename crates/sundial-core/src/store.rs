//! The persistence boundary for world time.
//!
//! The clock authority persists through this trait: the current timestamp
//! on every successful advance, and trigger records on every schedule,
//! cancel, and firing. The contract that matters for correctness is
//! ordering -- during an advance, persistence completes *before* any
//! notification is published, so a crash can lose an advance but can never
//! deliver notifications for a timestamp that was not durably recorded.
//!
//! [`MemoryTimeStore`] is the in-crate reference implementation, used by
//! tests and embeddings that do not need durability. The `PostgreSQL`
//! implementation lives in `sundial-store`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use sundial_types::{ScheduledTrigger, TriggerId, WorldTimestamp};

/// Errors surfaced by persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("persistence backend error: {message}")]
    Backend {
        /// Description of the backend failure.
        message: String,
    },

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {source}")]
    Serialization {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },
}

/// Everything the boundary restores at startup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PersistedWorld {
    /// The last persisted timestamp, if one was ever saved.
    pub timestamp: Option<WorldTimestamp>,
    /// All pending triggers.
    pub triggers: Vec<ScheduledTrigger>,
}

/// Async persistence boundary for the clock authority.
///
/// Implementations must make [`persist_advance`](TimeStore::persist_advance)
/// atomic: either the new timestamp and all trigger consequences are
/// recorded, or none of them are.
pub trait TimeStore: Send + Sync + 'static {
    /// Load the persisted world, if any.
    fn load(&self) -> impl Future<Output = Result<PersistedWorld, StoreError>> + Send;

    /// Persist the current timestamp outside an advance (initialization).
    fn save_timestamp(
        &self,
        timestamp: &WorldTimestamp,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert or update one trigger record.
    fn upsert_trigger(
        &self,
        trigger: &ScheduledTrigger,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete one trigger record. Deleting an absent id is a no-op.
    fn delete_trigger(
        &self,
        id: TriggerId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically persist the consequences of one advance: the new
    /// timestamp, the fired one-shot deletions, and the recurring
    /// reschedules.
    fn persist_advance(
        &self,
        timestamp: &WorldTimestamp,
        removed: &[TriggerId],
        rescheduled: &[ScheduledTrigger],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Interior state of the in-memory store.
#[derive(Debug, Default)]
struct MemoryState {
    timestamp: Option<WorldTimestamp>,
    triggers: HashMap<TriggerId, ScheduledTrigger>,
}

/// In-memory [`TimeStore`] for tests and non-durable embeddings.
///
/// Supports one-shot failure injection so callers can exercise the
/// persistence-failure path of `advance` (nothing published, timestamp
/// unchanged).
#[derive(Debug, Default)]
pub struct MemoryTimeStore {
    state: RwLock<MemoryState>,
    fail_next: AtomicBool,
}

impl MemoryTimeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next persisting operation fail with a backend error.
    pub fn fail_next_persist(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// The last persisted timestamp, for assertions.
    pub fn persisted_timestamp(&self) -> Option<WorldTimestamp> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .timestamp
    }

    /// Number of persisted trigger records, for assertions.
    pub fn persisted_trigger_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .triggers
            .len()
    }

    fn take_injected_failure(&self) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend {
                message: String::from("injected failure"),
            });
        }
        Ok(())
    }
}

impl TimeStore for MemoryTimeStore {
    async fn load(&self) -> Result<PersistedWorld, StoreError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(PersistedWorld {
            timestamp: state.timestamp,
            triggers: state.triggers.values().cloned().collect(),
        })
    }

    async fn save_timestamp(&self, timestamp: &WorldTimestamp) -> Result<(), StoreError> {
        self.take_injected_failure()?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.timestamp = Some(*timestamp);
        Ok(())
    }

    async fn upsert_trigger(&self, trigger: &ScheduledTrigger) -> Result<(), StoreError> {
        self.take_injected_failure()?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.triggers.insert(trigger.id, trigger.clone());
        Ok(())
    }

    async fn delete_trigger(&self, id: TriggerId) -> Result<(), StoreError> {
        self.take_injected_failure()?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.triggers.remove(&id);
        Ok(())
    }

    async fn persist_advance(
        &self,
        timestamp: &WorldTimestamp,
        removed: &[TriggerId],
        rescheduled: &[ScheduledTrigger],
    ) -> Result<(), StoreError> {
        self.take_injected_failure()?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.timestamp = Some(*timestamp);
        for id in removed {
            state.triggers.remove(id);
        }
        for trigger in rescheduled {
            state.triggers.insert(trigger.id, trigger.clone());
        }
        Ok(())
    }
}
