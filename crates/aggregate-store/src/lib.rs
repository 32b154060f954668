//! Aggregate persistence contract for the dispatch core.
//!
//! The dispatch core hands every successfully published domain command to an
//! [`AggregateStore`] as a single [`AggregateRecord`]. Real backends live
//! outside this workspace; [`InMemoryAggregateStore`] is the reference
//! implementation used by tests and the demo.

pub mod error;
pub mod event;
pub mod memory;
pub mod record;
pub mod store;

pub use common::{AggregateId, CommandId, EventId};
pub use error::{Result, StoreError};
pub use event::{EventEnvelope, Version};
pub use memory::{InMemoryAggregateStore, StoredAggregate};
pub use record::{AggregateRecord, CommandRecord};
pub use store::{AggregateStore, validate_record};
