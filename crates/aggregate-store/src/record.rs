//! Records handed to an aggregate store on save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, CommandId, EventEnvelope, Version};

/// The serialized command that caused an aggregate change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Identifier of the dispatch that carried this command.
    pub command_id: CommandId,

    /// The concrete command type name.
    pub command_type: String,

    /// The aggregate the command targeted.
    pub aggregate_id: AggregateId,

    /// When the command was dispatched.
    pub timestamp: DateTime<Utc>,

    /// The command payload as JSON.
    pub payload: serde_json::Value,
}

impl CommandRecord {
    /// Serializes a command into a record.
    pub fn from_command<T: Serialize>(
        command_id: CommandId,
        command_type: impl Into<String>,
        aggregate_id: AggregateId,
        command: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            command_id,
            command_type: command_type.into(),
            aggregate_id,
            timestamp: Utc::now(),
            payload: serde_json::to_value(command)?,
        })
    }
}

/// Everything a single domain command dispatch asks the store to persist.
///
/// `events` carry versions continuing from `base_version`, the version the
/// aggregate had when its handler loaded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// The aggregate being saved.
    pub aggregate_id: AggregateId,

    /// The aggregate type name.
    pub aggregate_type: String,

    /// Version of the aggregate before this change.
    pub base_version: Version,

    /// Version the caller requires the stored aggregate to be at, if any.
    pub expected_version: Option<Version>,

    /// The aggregate state after the change, as JSON.
    pub state: serde_json::Value,

    /// The events produced by the change, in order.
    pub events: Vec<EventEnvelope>,

    /// The command that produced the change, when command data is saved.
    pub command: Option<CommandRecord>,
}

impl AggregateRecord {
    /// Creates a record with no events and no command data.
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        base_version: Version,
        state: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            base_version,
            expected_version: None,
            state,
            events: Vec::new(),
            command: None,
        }
    }

    /// Sets the events to persist.
    pub fn with_events(mut self, events: Vec<EventEnvelope>) -> Self {
        self.events = events;
        self
    }

    /// Requires the stored aggregate to be at `version`.
    pub fn expecting(mut self, version: Option<Version>) -> Self {
        self.expected_version = version;
        self
    }

    /// Attaches the originating command.
    pub fn with_command(mut self, command: Option<CommandRecord>) -> Self {
        self.command = command;
        self
    }

    /// Returns the aggregate version once this record is applied.
    pub fn new_version(&self) -> Version {
        self.base_version.advance(self.events.len())
    }
}
