use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when persisting aggregates.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored version did not match the version the save expected.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The record handed to the store is internally inconsistent.
    #[error("Invalid aggregate record: {0}")]
    InvalidRecord(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing storage could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for aggregate store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
