use thiserror::Error;

use crate::Destination;

/// Errors raised while handing a message to a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker could not be reached.
    #[error("Connection to {destination} failed: {reason}")]
    ConnectionFailed {
        destination: Destination,
        reason: String,
    },

    /// The broker refused the message.
    #[error("Message rejected by {destination}: {reason}")]
    Rejected {
        destination: Destination,
        reason: String,
    },

    /// The message body could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
