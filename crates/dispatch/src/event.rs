//! Events, the domain event envelope and the event factory.
//!
//! Handlers hand events to the core as `Box<dyn Event>`. Subscribers, on the
//! other hand, register against one concrete event type. The
//! [`EventFactory`] bridges the two: it unwraps any [`DomainEvent`] envelope
//! and captures the concrete `TypeId` of the payload in a [`ConcreteEvent`],
//! which is what the publisher routes on.

use std::any::{Any, TypeId};
use std::fmt;

use aggregate_store::Version;
use chrono::{DateTime, Utc};
use common::{AggregateId, CommandId, EventId};
use serde::ser::{Error as _, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{DispatchError, Result};

/// Returns the last path segment of a type name (`my_app::AccountOpened` → `AccountOpened`).
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

/// Runtime type access for events.
///
/// Implemented automatically for every `'static` serializable type; it lets
/// the core recover the concrete type and JSON form of a `dyn Event`.
pub trait EventAny: Any + Send + Sync {
    /// Returns the value as `Any` for downcasting.
    fn as_any(&self) -> &(dyn Any + Send + Sync);

    /// Converts the boxed value into a boxed `Any`.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    /// Returns the `TypeId` of the concrete type.
    fn concrete_type_id(&self) -> TypeId;

    /// Serializes the value to JSON.
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T: Any + Send + Sync + Serialize> EventAny for T {
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn concrete_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// A fact produced by handling a command.
///
/// Events are named in past tense. `event_type` is the kind tag subscribers
/// and stores see; it defaults to the type's own name.
pub trait Event: EventAny + fmt::Debug {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// Metadata stamped on every event a domain command produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: EventId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub command_id: CommandId,
    /// Aggregate version after this event.
    pub version: Version,
    pub timestamp: DateTime<Utc>,
}

/// Generic envelope around an event raised by an aggregate.
///
/// The envelope is never delivered to subscribers as such; the factory
/// unwraps it and passes the metadata alongside the payload.
#[derive(Debug)]
pub struct DomainEvent {
    pub metadata: EventMetadata,
    pub payload: Box<dyn Event>,
}

impl DomainEvent {
    pub fn new(metadata: EventMetadata, payload: Box<dyn Event>) -> Self {
        Self { metadata, payload }
    }
}

impl Serialize for DomainEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let payload = self.payload.to_json().map_err(S::Error::custom)?;
        let mut state = serializer.serialize_struct("DomainEvent", 3)?;
        state.serialize_field("event_type", self.payload.event_type())?;
        state.serialize_field("metadata", &self.metadata)?;
        state.serialize_field("payload", &payload)?;
        state.end()
    }
}

impl Event for DomainEvent {
    fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// An event re-expressed as its most-derived runtime type.
#[derive(Debug)]
pub struct ConcreteEvent {
    type_id: TypeId,
    event_type: &'static str,
    metadata: Option<EventMetadata>,
    payload: Box<dyn Event>,
}

impl ConcreteEvent {
    /// Returns the `TypeId` subscribers are looked up by.
    pub fn concrete_type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// Returns the domain metadata when the event came from an aggregate.
    pub fn metadata(&self) -> Option<&EventMetadata> {
        self.metadata.as_ref()
    }

    /// Returns the concrete event.
    pub fn payload(&self) -> &dyn Event {
        &*self.payload
    }

    /// Returns true if the concrete type is `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    /// Borrows the event as `E` if that is its concrete type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.payload().as_any().downcast_ref::<E>()
    }

    /// Serializes the concrete event (without metadata) to JSON.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        self.payload().to_json()
    }

    /// Turns the event back into its polymorphic form, re-wrapping metadata.
    pub fn into_event(self) -> Box<dyn Event> {
        match self.metadata {
            Some(metadata) => Box::new(DomainEvent::new(metadata, self.payload)),
            None => self.payload,
        }
    }
}

/// Recovers the concrete runtime type of events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFactory;

impl EventFactory {
    pub fn new() -> Self {
        Self
    }

    /// Re-expresses `event` as its concrete type.
    ///
    /// Envelopes are unwrapped (the outermost metadata wins). Concretizing an
    /// already concrete event yields the same type again.
    pub fn concretize(&self, event: Box<dyn Event>) -> Result<ConcreteEvent> {
        let mut event = event;
        let mut metadata = None;

        while event.as_any().is::<DomainEvent>() {
            let envelope = event.into_any().downcast::<DomainEvent>().map_err(|_| {
                DispatchError::Factory("domain event envelope changed type".to_string())
            })?;
            let DomainEvent {
                metadata: envelope_metadata,
                payload,
            } = *envelope;
            metadata.get_or_insert(envelope_metadata);
            event = payload;
        }

        let event_type = event.event_type();
        if event_type.is_empty() {
            return Err(DispatchError::Factory(format!(
                "event {event:?} has an empty type tag"
            )));
        }

        Ok(ConcreteEvent {
            type_id: event.concrete_type_id(),
            event_type,
            metadata,
            payload: event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct SomethingCreated {
        name: String,
    }

    impl Event for SomethingCreated {}

    #[derive(Debug, Serialize)]
    struct Renamed;

    impl Event for Renamed {
        fn event_type(&self) -> &'static str {
            "SomethingRenamed"
        }
    }

    #[derive(Debug, Serialize)]
    struct Untagged;

    impl Event for Untagged {
        fn event_type(&self) -> &'static str {
            ""
        }
    }

    fn metadata() -> EventMetadata {
        EventMetadata {
            event_id: EventId::new(),
            aggregate_id: AggregateId::new(),
            aggregate_type: "Aggregate".to_string(),
            command_id: CommandId::new(),
            version: Version::first(),
            timestamp: Utc::now(),
        }
    }

    fn created() -> Box<dyn Event> {
        Box::new(SomethingCreated {
            name: "thing".to_string(),
        })
    }

    #[test]
    fn default_event_type_is_short_type_name() {
        assert_eq!(created().event_type(), "SomethingCreated");
        assert_eq!(Renamed.event_type(), "SomethingRenamed");
    }

    #[test]
    fn short_type_name_keeps_generic_arguments() {
        assert_eq!(short_type_name::<Vec<String>>(), "Vec<alloc::string::String>");
        assert_eq!(short_type_name::<u32>(), "u32");
    }

    #[test]
    fn concretize_plain_event() {
        let concrete = EventFactory::new().concretize(created()).unwrap();

        assert!(concrete.is::<SomethingCreated>());
        assert_eq!(concrete.concrete_type_id(), TypeId::of::<SomethingCreated>());
        assert_eq!(concrete.event_type(), "SomethingCreated");
        assert!(concrete.metadata().is_none());
        assert_eq!(
            concrete.downcast_ref::<SomethingCreated>().unwrap().name,
            "thing"
        );
    }

    #[test]
    fn concretize_unwraps_domain_envelope() {
        let meta = metadata();
        let wrapped: Box<dyn Event> = Box::new(DomainEvent::new(meta.clone(), created()));

        let concrete = EventFactory::new().concretize(wrapped).unwrap();

        assert!(concrete.is::<SomethingCreated>());
        assert!(!concrete.is::<DomainEvent>());
        assert_eq!(concrete.metadata(), Some(&meta));
    }

    #[test]
    fn concretize_nested_envelopes_keeps_outer_metadata() {
        let outer = metadata();
        let inner: Box<dyn Event> = Box::new(DomainEvent::new(metadata(), created()));
        let wrapped: Box<dyn Event> = Box::new(DomainEvent::new(outer.clone(), inner));

        let concrete = EventFactory::new().concretize(wrapped).unwrap();

        assert!(concrete.is::<SomethingCreated>());
        assert_eq!(concrete.metadata(), Some(&outer));
    }

    #[test]
    fn concretize_is_idempotent() {
        let factory = EventFactory::new();
        let wrapped: Box<dyn Event> = Box::new(DomainEvent::new(metadata(), created()));

        let first = factory.concretize(wrapped).unwrap();
        let first_type = first.concrete_type_id();
        let first_meta = first.metadata().cloned();
        let second = factory.concretize(first.into_event()).unwrap();

        assert_eq!(second.concrete_type_id(), first_type);
        assert_eq!(second.metadata().cloned(), first_meta);
    }

    #[test]
    fn concretize_rejects_empty_type_tag() {
        let result = EventFactory::new().concretize(Box::new(Untagged));
        assert!(matches!(result, Err(DispatchError::Factory(_))));
    }

    #[test]
    fn domain_event_serializes_payload_and_metadata() {
        let meta = metadata();
        let event = DomainEvent::new(meta.clone(), created());

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"], "SomethingCreated");
        assert_eq!(json["payload"], serde_json::json!({"name": "thing"}));
        assert_eq!(json["metadata"]["version"], 1);
    }
}
