//! The event bus: synchronous, ordered, in-process fan-out.
//!
//! Delivery is strictly layered: all handlers for one notification run to
//! completion, in subscription order, before the next notification of the
//! same advance is published. Handlers are synchronous on purpose --
//! correctness-critical reactions (expiring a buff, invalidating a cache
//! line) must observe every transition, so they cannot be shunted onto a
//! background task. Anything expensive belongs on the async work
//! dispatcher, not in a handler.
//!
//! Nested publishing and `advance`-from-a-handler are both detected via a
//! thread-local delivery depth and rejected with typed errors; the
//! publish pass per advance is a flat sequence, never a tree.

use std::cell::Cell;
use std::sync::{Arc, PoisonError, RwLock};

use sundial_types::{Notification, NotificationKind, SubscriptionId};
use tracing::trace;

thread_local! {
    /// Number of delivery passes currently on this thread's stack.
    static DELIVERY_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Errors that can occur when publishing.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// `publish` was called from inside a handler.
    #[error("nested publish rejected: handlers must not publish notifications")]
    NestedPublish,
}

/// Boxed handler invoked for each matching notification.
pub type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

/// One registered subscription.
struct Subscription {
    id: SubscriptionId,
    /// `None` subscribes to every kind (wildcard).
    filter: Option<NotificationKind>,
    handler: Handler,
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// In-process publish/subscribe fan-out with deterministic delivery order.
///
/// Cheap to clone; clones share the subscriber list.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<Vec<Subscription>>>,
}

/// Decrements the delivery depth when a publish pass unwinds.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        DELIVERY_DEPTH.with(|depth| depth.set(depth.get().saturating_add(1)));
        Self
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DELIVERY_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one notification kind, or for all kinds when
    /// `filter` is `None`.
    ///
    /// Handlers are invoked in subscription order, interleaved across
    /// filtered and wildcard subscriptions alike.
    pub fn subscribe(
        &self,
        filter: Option<NotificationKind>,
        handler: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        let mut subs = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        subs.push(Subscription {
            id,
            filter,
            handler: Arc::new(handler),
        });
        id
    }

    /// Register a handler for a single notification kind.
    pub fn on(
        &self,
        kind: NotificationKind,
        handler: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(Some(kind), handler)
    }

    /// Register a handler for every notification kind.
    pub fn on_wildcard(
        &self,
        handler: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(None, handler)
    }

    /// Remove a subscription. Returns `false` for unknown ids.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|sub| sub.id != id);
        subs.len() < before
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the calling thread is currently inside a delivery pass.
    ///
    /// The clock authority consults this to reject `advance` calls made
    /// from inside a handler.
    pub fn in_delivery(&self) -> bool {
        DELIVERY_DEPTH.with(Cell::get) > 0
    }

    /// Deliver a notification to every matching handler, in subscription
    /// order.
    ///
    /// The subscriber list is snapshotted before delivery, so handlers may
    /// subscribe or unsubscribe without deadlocking; changes take effect
    /// from the next publish.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NestedPublish`] when called from inside a
    /// handler; the nested notification is not delivered.
    pub fn publish(&self, notification: &Notification) -> Result<(), BusError> {
        if self.in_delivery() {
            return Err(BusError::NestedPublish);
        }

        let kind = notification.kind();
        let handlers: Vec<Handler> = {
            let subs = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            subs.iter()
                .filter(|sub| sub.filter.is_none() || sub.filter == Some(kind))
                .map(|sub| Arc::clone(&sub.handler))
                .collect()
        };

        trace!(?kind, handler_count = handlers.len(), "Delivering notification");

        let _guard = DepthGuard::enter();
        for handler in handlers {
            handler(notification);
        }
        Ok(())
    }
}
