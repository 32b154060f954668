//! Identifier types shared by every crate in the dispatch workspace.

mod types;

pub use types::{AggregateId, CommandId, EventId};
