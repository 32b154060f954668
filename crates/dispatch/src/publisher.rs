//! Event publication.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BoxError, DispatchError, Result};
use crate::event::{ConcreteEvent, Event, EventFactory, EventMetadata};
use crate::registry::HandlerRegistry;

/// Reacts to one concrete event type.
///
/// `metadata` is present when the event was raised by an aggregate.
#[async_trait]
pub trait EventSubscriber<E: Event>: Send + Sync {
    async fn handle(
        &self,
        event: &E,
        metadata: Option<&EventMetadata>,
    ) -> std::result::Result<(), BoxError>;
}

/// Subscriber with its event type erased, as stored in the registry.
#[async_trait]
pub(crate) trait ErasedSubscriber: Send + Sync {
    fn subscriber_name(&self) -> &'static str;

    async fn deliver(&self, event: &ConcreteEvent) -> std::result::Result<(), BoxError>;
}

pub(crate) struct TypedSubscriber<E, S> {
    subscriber: S,
    _event: PhantomData<fn(&E)>,
}

impl<E, S> TypedSubscriber<E, S> {
    pub(crate) fn new(subscriber: S) -> Self {
        Self {
            subscriber,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E, S> ErasedSubscriber for TypedSubscriber<E, S>
where
    E: Event,
    S: EventSubscriber<E>,
{
    fn subscriber_name(&self) -> &'static str {
        std::any::type_name::<S>()
    }

    async fn deliver(&self, event: &ConcreteEvent) -> std::result::Result<(), BoxError> {
        let typed = event.downcast_ref::<E>().ok_or_else(|| {
            format!(
                "subscriber of {} received {}",
                std::any::type_name::<E>(),
                event.event_type()
            )
        })?;
        self.subscriber.handle(typed, event.metadata()).await
    }
}

/// Delivers concrete events to their subscribers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    ///
    /// Publishing an event nobody subscribes to succeeds.
    async fn publish(&self, event: &ConcreteEvent) -> Result<()>;
}

/// Publishes to the subscribers held by a [`HandlerRegistry`].
///
/// Subscribers run one at a time in registration order. The first failure
/// stops delivery of that event and is returned as
/// [`DispatchError::Publication`].
#[derive(Debug, Clone)]
pub struct RegistryPublisher {
    registry: Arc<HandlerRegistry>,
}

impl RegistryPublisher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EventPublisher for RegistryPublisher {
    #[tracing::instrument(skip(self, event), fields(event_type = event.event_type()))]
    async fn publish(&self, event: &ConcreteEvent) -> Result<()> {
        let subscribers = self.registry.subscribers_for(event.concrete_type_id());
        if subscribers.is_empty() {
            tracing::trace!("no subscribers");
        }

        for subscriber in subscribers {
            subscriber
                .deliver(event)
                .await
                .map_err(|source| DispatchError::Publication {
                    event_type: event.event_type(),
                    subscriber: subscriber.subscriber_name(),
                    source,
                })?;
        }

        metrics::counter!("dispatch_events_published_total", "event_type" => event.event_type())
            .increment(1);
        Ok(())
    }
}

/// Concretizes `events` and publishes them one after another.
///
/// Every event is concretized even when `publish` is false. Publication stops
/// at the first failure; later events are not delivered.
pub(crate) async fn publish_all(
    factory: &EventFactory,
    publisher: &dyn EventPublisher,
    events: Vec<Box<dyn Event>>,
    publish: bool,
) -> Result<Vec<ConcreteEvent>> {
    let mut published = Vec::with_capacity(events.len());
    for event in events {
        let concrete = factory.concretize(event)?;
        if publish {
            publisher.publish(&concrete).await?;
        }
        published.push(concrete);
    }
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::sync::Mutex;

    #[derive(Debug, Serialize)]
    struct Opened;

    impl Event for Opened {}

    #[derive(Debug, Serialize)]
    struct Closed;

    impl Event for Closed {}

    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct Recording {
        name: &'static str,
        journal: Journal,
        fail: bool,
    }

    #[async_trait]
    impl<E: Event> EventSubscriber<E> for Recording {
        async fn handle(
            &self,
            event: &E,
            _metadata: Option<&EventMetadata>,
        ) -> std::result::Result<(), BoxError> {
            self.journal
                .0
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.event_type()));
            if self.fail {
                return Err("subscriber failed".into());
            }
            Ok(())
        }
    }

    fn recording(name: &'static str, journal: &Journal, fail: bool) -> Recording {
        Recording {
            name,
            journal: journal.clone(),
            fail,
        }
    }

    fn concrete(event: impl Event) -> ConcreteEvent {
        EventFactory::new().concretize(Box::new(event)).unwrap()
    }

    #[tokio::test]
    async fn delivers_in_registration_order() {
        let journal = Journal::default();
        let registry = HandlerRegistry::builder()
            .subscriber::<Opened, _>(recording("first", &journal, false))
            .subscriber::<Opened, _>(recording("second", &journal, false))
            .subscriber::<Closed, _>(recording("other", &journal, false))
            .build();
        let publisher = RegistryPublisher::new(Arc::new(registry));

        publisher.publish(&concrete(Opened)).await.unwrap();

        assert_eq!(journal.entries(), ["first:Opened", "second:Opened"]);
    }

    #[tokio::test]
    async fn stops_at_first_failing_subscriber() {
        let journal = Journal::default();
        let registry = HandlerRegistry::builder()
            .subscriber::<Opened, _>(recording("first", &journal, true))
            .subscriber::<Opened, _>(recording("second", &journal, false))
            .build();
        let publisher = RegistryPublisher::new(Arc::new(registry));

        let err = publisher.publish(&concrete(Opened)).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Publication {
                event_type: "Opened",
                ..
            }
        ));
        assert_eq!(journal.entries(), ["first:Opened"]);
    }

    #[tokio::test]
    async fn event_without_subscribers_is_accepted() {
        let publisher = RegistryPublisher::new(Arc::new(HandlerRegistry::default()));

        assert!(publisher.publish(&concrete(Closed)).await.is_ok());
    }

    #[tokio::test]
    async fn publish_all_skips_delivery_when_disabled() {
        let journal = Journal::default();
        let registry = HandlerRegistry::builder()
            .subscriber::<Opened, _>(recording("first", &journal, false))
            .build();
        let publisher = RegistryPublisher::new(Arc::new(registry));

        let events: Vec<Box<dyn Event>> = vec![Box::new(Opened), Box::new(Opened)];
        let concrete = publish_all(&EventFactory::new(), &publisher, events, false)
            .await
            .unwrap();

        assert_eq!(concrete.len(), 2);
        assert!(journal.entries().is_empty());
    }

    #[tokio::test]
    async fn publish_all_stops_after_failed_event() {
        let journal = Journal::default();
        let registry = HandlerRegistry::builder()
            .subscriber::<Opened, _>(recording("opened", &journal, true))
            .subscriber::<Closed, _>(recording("closed", &journal, false))
            .build();
        let publisher = RegistryPublisher::new(Arc::new(registry));

        let events: Vec<Box<dyn Event>> = vec![Box::new(Opened), Box::new(Closed)];
        let result = publish_all(&EventFactory::new(), &publisher, events, true).await;

        assert!(result.is_err());
        assert_eq!(journal.entries(), ["opened:Opened"]);
    }
}
