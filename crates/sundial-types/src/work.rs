//! Async work items and idempotency keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::WorkStatus;
use crate::ids::WorkId;

/// Stable identifier over the *semantic* content of a work request.
///
/// Two submissions that mean the same thing (same region, same generation
/// seed) must carry the same key, regardless of when or how often they are
/// submitted. Result application is keyed by this value: applying under a
/// key that has already been applied is a no-op, which is what makes
/// at-least-once execution safe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Create a key from a stable string form of the request.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of async-dispatched computation, as visible through the
/// dispatcher's status surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identity of this submission.
    pub id: WorkId,

    /// Semantic identity of the request (see [`IdempotencyKey`]).
    pub idempotency_key: IdempotencyKey,

    /// Opaque payload handed to the executor.
    pub payload: Value,

    /// Current lifecycle state.
    pub status: WorkStatus,

    /// Number of execution attempts so far.
    pub attempts: u32,

    /// Wall-clock submission time.
    pub submitted_at: DateTime<Utc>,
}

/// Terminal outcome of a work item, as seen by completion callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkOutcome {
    /// The executor produced a result and this was the first application
    /// for the item's idempotency key.
    Completed(
        /// The executor's result value.
        Value,
    ),
    /// The executor produced a result, but another item already applied
    /// under the same idempotency key; this result was discarded.
    Superseded,
    /// The item exhausted its retry budget.
    Failed(
        /// Description of the terminal failure.
        String,
    ),
    /// The item was cancelled; any result was discarded.
    Cancelled,
}
