//! Composition root for the Sundial world-time kernel.
//!
//! [`World`] wires the clock authority, event bus, cache, and async work
//! dispatcher into one handle, restores persisted state through the
//! [`TimeStore`] boundary at startup, and assembles the [`StatusReport`]
//! consumed by operational-visibility layers. The optional NATS relay
//! mirrors every bus notification onto `time.<kind>` subjects for
//! out-of-process observers.
//!
//! # Modules
//!
//! - [`world`] -- The [`World`] composition root.
//! - [`relay`] -- The NATS notification relay.
//!
//! [`World`]: world::World
//! [`TimeStore`]: sundial_core::store::TimeStore
//! [`StatusReport`]: sundial_types::StatusReport

pub mod relay;
pub mod world;

pub use relay::{NatsRelay, RelayError};
pub use world::World;
