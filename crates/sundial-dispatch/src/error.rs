//! Error types for the async work dispatcher.

/// Errors returned by the dispatcher's submission surface.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher has been shut down; no further work is accepted.
    #[error("dispatcher is shut down")]
    ShutDown,
}

/// Failure reported by a [`WorkExecutor`](crate::dispatcher::WorkExecutor).
///
/// The split decides retry behavior: transient failures are retried per
/// the bounded backoff policy, permanent failures end the item
/// immediately.
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    /// Worth retrying (resource contention, remote hiccup).
    #[error("transient failure: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// Retrying cannot help (malformed request, invariant violation).
    #[error("permanent failure: {message}")]
    Permanent {
        /// Description of the failure.
        message: String,
    },
}

impl WorkError {
    /// Build a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Build a permanent failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }
}
