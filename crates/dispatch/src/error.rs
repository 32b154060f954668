//! Dispatch error types.

use aggregate_store::StoreError;
use message_bus::TransportError;
use thiserror::Error;

/// Error type returned by handlers and subscribers supplied by the application.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while dispatching.
///
/// The core never recovers from any of these: each one reaches the caller of
/// the [`Dispatcher`](crate::Dispatcher) exactly as it was raised.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A required argument was absent.
    #[error("Invalid argument: {0} must be present")]
    Argument(&'static str),

    /// No handler is registered for the contract.
    #[error("No handler registered for {contract}")]
    Resolution { contract: String },

    /// More than one handler is registered for the contract.
    #[error("{count} handlers registered for {contract}, expected exactly one")]
    AmbiguousResolution { contract: String, count: usize },

    /// The concrete type of an event could not be determined.
    #[error("Cannot determine concrete event type: {0}")]
    Factory(String),

    /// The resolved handler failed.
    #[error("Handler for {contract} failed: {source}")]
    Handler {
        contract: String,
        #[source]
        source: BoxError,
    },

    /// An event subscriber failed during publication.
    #[error("Subscriber {subscriber} failed on {event_type}: {source}")]
    Publication {
        event_type: &'static str,
        subscriber: &'static str,
        #[source]
        source: BoxError,
    },

    /// The aggregate store could not save the aggregate.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The bus transport could not send the message.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A blocking call was made from a thread already driving an async runtime.
    #[error("Blocking dispatch called from within an async runtime")]
    BlockingInAsync,
}

impl DispatchError {
    /// Short, stable name of the error kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Argument(_) => "argument",
            DispatchError::Resolution { .. } => "resolution",
            DispatchError::AmbiguousResolution { .. } => "ambiguous_resolution",
            DispatchError::Factory(_) => "factory",
            DispatchError::Handler { .. } => "handler",
            DispatchError::Publication { .. } => "publication",
            DispatchError::Persistence(_) => "persistence",
            DispatchError::Transport(_) => "transport",
            DispatchError::BlockingInAsync => "blocking_in_async",
        }
    }

    /// Returns true for registration mistakes that no retry can fix.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            DispatchError::Resolution { .. } | DispatchError::AmbiguousResolution { .. }
        )
    }
}

/// Logs and counts a failed dispatch without altering the error.
pub(crate) fn record_failure(error: &DispatchError) {
    tracing::warn!(error = %error, kind = error.kind(), "dispatch failed");
    metrics::counter!("dispatch_failures_total", "kind" => error.kind()).increment(1);
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
