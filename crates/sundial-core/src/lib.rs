//! Deterministic world-time kernel for the Sundial workspace.
//!
//! This crate owns the shared notion of game time: a single monotonic
//! timestamp, the calendar that gives it meaning, the trigger store that
//! fires scheduled consequences exactly once, and the event bus that tells
//! every subsystem what just happened, in a fixed order.
//!
//! # Modules
//!
//! - [`calendar`] -- Validated calendar: normalization to absolute minutes,
//!   timestamp arithmetic, and derivation of season and time-of-day block.
//! - [`clock`] -- [`TimeAuthority`]: the serialized `advance` path, pure
//!   reads, and forward scans.
//! - [`scheduler`] -- [`TriggerStore`]: durable registry of future triggers.
//! - [`bus`] -- [`EventBus`]: synchronous, ordered, in-process fan-out.
//! - [`cache`] -- [`WorldCache`]: scope-tagged read views evicted by bus
//!   notifications.
//! - [`config`] -- Typed YAML configuration for the whole kernel.
//! - [`store`] -- The [`TimeStore`] persistence boundary and its in-memory
//!   reference implementation.
//!
//! [`TimeAuthority`]: clock::TimeAuthority
//! [`TriggerStore`]: scheduler::TriggerStore
//! [`EventBus`]: bus::EventBus
//! [`WorldCache`]: cache::WorldCache
//! [`TimeStore`]: store::TimeStore

pub mod bus;
pub mod cache;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod scheduler;
pub mod store;
