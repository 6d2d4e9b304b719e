//! `PostgreSQL` persistence boundary for the Sundial kernel.
//!
//! Implements [`sundial_core::store::TimeStore`] over a [`sqlx`] connection
//! pool. The clock lives in a single-row table; triggers live in their own
//! table keyed by UUID. [`persist_advance`] wraps the timestamp write,
//! one-shot deletions, and recurring reschedules in one transaction, which
//! is what makes the advance path's persist-before-publish contract hold
//! across a crash.
//!
//! Uses runtime query construction (not compile-time checked) so no live
//! database is required at build time. All queries are parameterized.
//!
//! [`persist_advance`]: sundial_core::store::TimeStore::persist_advance

pub mod postgres;

pub use postgres::{PgTimeStore, PostgresConfig};
