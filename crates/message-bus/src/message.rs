use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// Unique identifier for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a message is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Destination {
    /// A queue: exactly one consumer receives the message.
    Queue(String),
    /// A topic: every subscription receives a copy.
    Topic(String),
}

impl Destination {
    /// Creates a queue destination.
    pub fn queue(name: impl Into<String>) -> Self {
        Self::Queue(name.into())
    }

    /// Creates a topic destination.
    pub fn topic(name: impl Into<String>) -> Self {
        Self::Topic(name.into())
    }

    /// Returns the queue or topic name.
    pub fn name(&self) -> &str {
        match self {
            Self::Queue(name) | Self::Topic(name) => name,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue(name) => write!(f, "queue '{name}'"),
            Self::Topic(name) => write!(f, "topic '{name}'"),
        }
    }
}

/// A message ready to be handed to a transport.
///
/// The body is the JSON encoding of the bus message; the transport never
/// interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Unique identifier for this message.
    pub message_id: MessageId,

    /// The message type used for routing (e.g., "AccountClosedNotification").
    pub message_type: String,

    /// The queue or topic to deliver to.
    pub destination: Destination,

    /// MIME type of the body.
    pub content_type: String,

    /// Encoded message body.
    pub body: Vec<u8>,

    /// Broker-level application properties.
    pub properties: HashMap<String, String>,

    /// Earliest time the broker should make the message visible.
    pub scheduled_enqueue_time: Option<DateTime<Utc>>,
}

impl OutboundMessage {
    /// Encodes `payload` as a JSON message for `destination`.
    pub fn json<T: Serialize>(
        message_type: impl Into<String>,
        destination: Destination,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_id: MessageId::new(),
            message_type: message_type.into(),
            destination,
            content_type: "application/json".to_string(),
            body: serde_json::to_vec(payload)?,
            properties: HashMap::new(),
            scheduled_enqueue_time: None,
        })
    }

    /// Adds an application property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Delays visibility until `at`.
    pub fn scheduled_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.scheduled_enqueue_time = at;
        self
    }

    /// Decodes the JSON body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
