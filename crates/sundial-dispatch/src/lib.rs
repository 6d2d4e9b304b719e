//! Async work dispatcher for the Sundial kernel.
//!
//! Expensive, non-time-critical computations (large point-of-interest
//! generation, market simulation passes) are handed to a tokio worker pool
//! instead of running inside notification handlers. Workers execute out of
//! band, retry transient failures with bounded backoff, and guarantee
//! at-least-once execution -- never exactly-once. Safety under duplicates
//! comes from first-application-wins keyed by idempotency key, not from
//! counting dispatches.
//!
//! A work item's real-world completion time is decoupled from game time:
//! completion never advances the clock. A completion callback that wants
//! the result to surface in-world schedules a trigger for a *future* game
//! timestamp, translating real latency into a player-visible in-world
//! delay.
//!
//! # Modules
//!
//! - [`dispatcher`] -- The [`Dispatcher`], worker pool, and
//!   [`WorkExecutor`] seam.
//! - [`error`] -- [`DispatchError`] and the transient/permanent
//!   [`WorkError`] split.
//!
//! [`Dispatcher`]: dispatcher::Dispatcher
//! [`WorkExecutor`]: dispatcher::WorkExecutor
//! [`DispatchError`]: error::DispatchError
//! [`WorkError`]: error::WorkError

pub mod dispatcher;
pub mod error;

pub use dispatcher::{Dispatcher, DispatcherStats, WorkExecutor, WorkRequest};
pub use error::{DispatchError, WorkError};
