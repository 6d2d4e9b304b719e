//! Scope-tagged read cache, invalidated by bus notifications.
//!
//! Entries declare which notification kind invalidates them. The cache
//! subscribes to the bus and evicts matching entries the moment that kind
//! is delivered, so a stale entry can survive at most until the next
//! notification its scope names -- never longer.
//!
//! Every advance closes with a `TimeProgressed` notification, so
//! [`CacheScope::UntilTimeProgressed`] entries live within a single
//! advance window. [`CacheScope::UntilCategoryChange`] entries survive
//! ordinary advances and die on the first boundary crossing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use sundial_types::{CacheScope, NotificationKind, SubscriptionId};
use tracing::trace;

use crate::bus::EventBus;

/// One cached value with its eviction scope.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    scope: CacheScope,
}

/// Interior state shared by cache handles.
#[derive(Debug, Default)]
struct CacheInner<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Short-lived read-optimized views of world state.
///
/// Cheap to clone; clones share entries and counters. Values are cloned
/// out on `get`, so `V` is typically an `Arc` or a small projection.
#[derive(Debug)]
pub struct WorldCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for WorldCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for WorldCache<V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(HashMap::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> WorldCache<V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value, counting the hit or miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self
            .inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        entries.get(key).map_or_else(
            || {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
            |entry| {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            },
        )
    }

    /// Insert or replace a value under the given eviction scope.
    pub fn put(&self, key: impl Into<String>, value: V, scope: CacheScope) {
        let mut entries = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.into(), Entry { value, scope });
    }

    /// Remove one entry. Returns `false` for unknown keys.
    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.remove(key).is_some()
    }

    /// Evict every entry carrying the given scope.
    pub fn evict_scope(&self, scope: CacheScope) {
        let mut entries = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_key, entry| entry.scope != scope);
        trace!(
            ?scope,
            evicted = before.saturating_sub(entries.len()),
            "Cache scope evicted"
        );
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lookups answered from the cache since creation.
    pub fn hits(&self) -> u64 {
        self.inner.hits.load(Ordering::Relaxed)
    }

    /// Lookups that missed since creation.
    pub fn misses(&self) -> u64 {
        self.inner.misses.load(Ordering::Relaxed)
    }

    /// Subscribe this cache to a bus for scope-driven eviction.
    ///
    /// Eviction runs synchronously inside the delivery pass, so by the
    /// time the subscriber after this one observes a notification, the
    /// matching entries are already gone.
    pub fn attach(&self, bus: &EventBus) -> SubscriptionId {
        let cache = self.clone();
        bus.on_wildcard(move |notification| match notification.kind() {
            NotificationKind::TimeProgressed => {
                cache.evict_scope(CacheScope::UntilTimeProgressed);
            }
            NotificationKind::CategoryChanged => {
                cache.evict_scope(CacheScope::UntilCategoryChange);
            }
            NotificationKind::TriggerFired | NotificationKind::WorkFailed => {}
        })
    }
}
