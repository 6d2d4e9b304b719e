//! NATS relay: mirror bus notifications to out-of-process observers.
//!
//! Bus handlers are synchronous and must return quickly, so the relay's
//! handler only serializes the notification and pushes it onto an
//! unbounded channel; a spawned task drains the channel and publishes to
//! NATS. Relay latency never slows an `advance`, and a NATS outage drops
//! relayed copies, never in-process delivery.
//!
//! Subjects are `time.<kind>`: `time.category_changed`,
//! `time.trigger_fired`, `time.time_progressed`, `time.work_failed`.

use sundial_core::bus::EventBus;
use sundial_types::{NotificationKind, SubscriptionId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors that can occur while attaching the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The NATS connection could not be established.
    #[error("NATS connect error: {message}")]
    Connect {
        /// Description of the connection failure.
        message: String,
    },
}

/// A running relay: the bus subscription plus the drain task.
#[derive(Debug)]
pub struct NatsRelay {
    subscription: SubscriptionId,
    drain: JoinHandle<()>,
}

impl NatsRelay {
    /// Connect to NATS and start mirroring every notification from `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connect`] if the connection fails; the bus is
    /// left untouched.
    pub async fn attach(bus: &EventBus, url: &str) -> Result<Self, RelayError> {
        info!(url, "Connecting NATS relay");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| RelayError::Connect {
                message: format!("failed to connect to {url}: {e}"),
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<(&'static str, Vec<u8>)>();

        let subscription = bus.on_wildcard(move |notification| {
            match serde_json::to_vec(notification) {
                Ok(bytes) => {
                    let subject = subject_for(notification.kind());
                    if tx.send((subject, bytes)).is_err() {
                        debug!("Relay drain task gone, dropping notification");
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Failed to serialize notification for relay");
                }
            }
        });

        let drain = tokio::spawn(async move {
            while let Some((subject, bytes)) = rx.recv().await {
                if let Err(err) = client.publish(subject, bytes.into()).await {
                    warn!(subject, error = %err, "Failed to relay notification");
                }
            }
            debug!("Relay drain task finished");
        });

        info!("NATS relay attached");
        Ok(Self {
            subscription,
            drain,
        })
    }

    /// Detach from the bus and stop the drain task.
    pub fn detach(self, bus: &EventBus) {
        bus.unsubscribe(self.subscription);
        self.drain.abort();
        info!("NATS relay detached");
    }
}

/// The NATS subject a notification kind is mirrored on.
const fn subject_for(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::CategoryChanged => "time.category_changed",
        NotificationKind::TriggerFired => "time.trigger_fired",
        NotificationKind::TimeProgressed => "time.time_progressed",
        NotificationKind::WorkFailed => "time.work_failed",
    }
}
