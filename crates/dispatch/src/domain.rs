//! Domain command sending.
//!
//! A domain command targets one aggregate. Its handler returns the mutated
//! aggregate; the sender drains the aggregate's uncommitted events, stamps
//! them with [`EventMetadata`], publishes them and finally saves the
//! aggregate, its events and optionally the command itself in one call to
//! the [`AggregateStore`].

use std::sync::Arc;
use std::time::Instant;

use aggregate_store::{
    AggregateRecord, AggregateStore, CommandRecord, EventEnvelope, StoreError, Version,
};
use async_trait::async_trait;
use chrono::Utc;
use common::{AggregateId, CommandId, EventId};
use serde::Serialize;

use crate::aggregate::AggregateRoot;
use crate::command::Command;
use crate::error::{BoxError, DispatchError, Result, record_failure};
use crate::event::{ConcreteEvent, DomainEvent, Event, EventFactory, EventMetadata, short_type_name};
use crate::options::DispatchOptions;
use crate::publisher::{EventPublisher, publish_all};
use crate::registry::{Contract, DomainCommandContract, HandlerResolver};

/// A command aimed at one aggregate.
pub trait DomainCommand: Command + Serialize {
    /// The aggregate the command acts on.
    fn aggregate_id(&self) -> AggregateId;

    /// Version the stored aggregate must be at for the save to succeed.
    fn expected_version(&self) -> Option<Version> {
        None
    }

    /// Per-command override of [`DispatchOptions::save_command_data`].
    fn save_command_data(&self) -> Option<bool> {
        None
    }
}

/// Handles a domain command and returns the aggregate it changed.
///
/// The handler loads the aggregate itself. It must not save it; the sender
/// does that after the events are published.
#[async_trait]
pub trait DomainCommandHandler<C: DomainCommand, A: Send + 'static>: Send + Sync {
    async fn handle(&self, command: &C) -> std::result::Result<A, BoxError>;
}

/// Sends domain commands, publishes their events and persists the aggregate.
pub struct DomainCommandSender<R> {
    resolver: R,
    publisher: Arc<dyn EventPublisher>,
    store: Arc<dyn AggregateStore>,
    factory: EventFactory,
    options: DispatchOptions,
}

impl<R: HandlerResolver> DomainCommandSender<R> {
    pub fn new(
        resolver: R,
        publisher: Arc<dyn EventPublisher>,
        store: Arc<dyn AggregateStore>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            resolver,
            publisher,
            store,
            factory: EventFactory::new(),
            options,
        }
    }

    /// Sends a domain command.
    ///
    /// The aggregate is saved exactly once and only after every event was
    /// published. Any failure before that leaves the store untouched.
    #[tracing::instrument(
        skip(self, command),
        fields(
            command_type = short_type_name::<C>(),
            aggregate_type = A::aggregate_type(),
        )
    )]
    pub async fn send<C, A>(&self, command: C) -> Result<()>
    where
        C: DomainCommand,
        A: AggregateRoot,
    {
        let started = Instant::now();
        let result = self.execute::<C, A>(&command).await.inspect_err(record_failure);

        metrics::counter!("dispatch_commands_total", "kind" => "domain_command").increment(1);
        metrics::histogram!("dispatch_command_duration_seconds", "kind" => "domain_command")
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Sends a domain command that may be absent.
    pub async fn send_optional<C, A>(&self, command: Option<C>) -> Result<()>
    where
        C: DomainCommand,
        A: AggregateRoot,
    {
        let command = command
            .ok_or(DispatchError::Argument("command"))
            .inspect_err(record_failure)?;
        self.send::<C, A>(command).await
    }

    async fn execute<C, A>(&self, command: &C) -> Result<()>
    where
        C: DomainCommand,
        A: AggregateRoot,
    {
        if command.aggregate_id().is_nil() {
            return Err(DispatchError::Argument("aggregate id"));
        }

        let handler = self.resolver.resolve::<DomainCommandContract<C, A>>()?;
        let mut aggregate =
            handler
                .handle(command)
                .await
                .map_err(|source| DispatchError::Handler {
                    contract: DomainCommandContract::<C, A>::describe(),
                    source,
                })?;

        let command_id = CommandId::new();
        let aggregate_id = aggregate.id();
        let base_version = aggregate.version();
        let events = stamp::<A>(
            aggregate.take_uncommitted_events(),
            aggregate_id,
            command_id,
            base_version,
        );

        let publish = command
            .publish_events()
            .unwrap_or(self.options.publish_events);
        let published = publish_all(&self.factory, &*self.publisher, events, publish).await?;

        let save_command = command
            .save_command_data()
            .unwrap_or(self.options.save_command_data);
        let command_record = if save_command {
            Some(
                CommandRecord::from_command(
                    command_id,
                    short_type_name::<C>(),
                    aggregate_id,
                    command,
                )
                .map_err(StoreError::from)?,
            )
        } else {
            None
        };

        let record = AggregateRecord::new(
            aggregate_id,
            A::aggregate_type(),
            base_version,
            serde_json::to_value(&aggregate).map_err(StoreError::from)?,
        )
        .with_events(envelopes(&published)?)
        .expecting(command.expected_version())
        .with_command(command_record);
        let new_version = record.new_version();

        self.store.save(record).await?;

        tracing::debug!(
            %aggregate_id,
            events = published.len(),
            version = %new_version,
            "domain command handled"
        );
        Ok(())
    }
}

/// Wraps each event in a [`DomainEvent`] carrying the version it produces.
fn stamp<A: AggregateRoot>(
    events: Vec<Box<dyn Event>>,
    aggregate_id: AggregateId,
    command_id: CommandId,
    base_version: Version,
) -> Vec<Box<dyn Event>> {
    events
        .into_iter()
        .enumerate()
        .map(|(index, payload)| {
            let metadata = EventMetadata {
                event_id: EventId::new(),
                aggregate_id,
                aggregate_type: A::aggregate_type().to_string(),
                command_id,
                version: base_version.advance(index + 1),
                timestamp: Utc::now(),
            };
            Box::new(DomainEvent::new(metadata, payload)) as Box<dyn Event>
        })
        .collect()
}

fn envelopes(events: &[ConcreteEvent]) -> Result<Vec<EventEnvelope>> {
    events
        .iter()
        .map(|event| -> Result<EventEnvelope> {
            let metadata = event.metadata().ok_or_else(|| {
                DispatchError::Factory(format!(
                    "domain event {} lost its metadata",
                    event.event_type()
                ))
            })?;
            let payload = event.to_json().map_err(StoreError::from)?;
            Ok(EventEnvelope::new(
                metadata.aggregate_id,
                metadata.aggregate_type.clone(),
                metadata.version,
                event.event_type(),
                payload,
            )
            .with_event_id(metadata.event_id)
            .caused_by(metadata.command_id)
            .recorded_at(metadata.timestamp))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::UncommittedEvents;
    use crate::publisher::RegistryPublisher;
    use crate::registry::HandlerRegistry;
    use aggregate_store::InMemoryAggregateStore;

    #[derive(Debug, Serialize)]
    struct Deposited {
        amount: u64,
    }

    impl Event for Deposited {}

    #[derive(Debug, Default, Serialize)]
    struct Account {
        id: AggregateId,
        balance: u64,
        #[serde(skip)]
        version: Version,
        #[serde(skip)]
        pending: UncommittedEvents,
    }

    impl AggregateRoot for Account {
        fn aggregate_type() -> &'static str {
            "Account"
        }

        fn id(&self) -> AggregateId {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn uncommitted_events(&self) -> &UncommittedEvents {
            &self.pending
        }

        fn take_uncommitted_events(&mut self) -> Vec<Box<dyn Event>> {
            self.pending.take()
        }
    }

    #[derive(Serialize)]
    struct Deposit {
        account: AggregateId,
        amounts: Vec<u64>,
    }

    impl Command for Deposit {}

    impl DomainCommand for Deposit {
        fn aggregate_id(&self) -> AggregateId {
            self.account
        }
    }

    struct DepositHandler;

    #[async_trait]
    impl DomainCommandHandler<Deposit, Account> for DepositHandler {
        async fn handle(&self, command: &Deposit) -> std::result::Result<Account, BoxError> {
            let mut account = Account {
                id: command.account,
                ..Account::default()
            };
            for amount in &command.amounts {
                account.balance += amount;
                account.pending.record(Deposited { amount: *amount });
            }
            Ok(account)
        }
    }

    fn sender(store: &InMemoryAggregateStore) -> DomainCommandSender<Arc<HandlerRegistry>> {
        let registry = Arc::new(
            HandlerRegistry::builder()
                .domain_command::<Deposit, Account, _>(DepositHandler)
                .build(),
        );
        DomainCommandSender::new(
            registry.clone(),
            Arc::new(RegistryPublisher::new(registry)),
            Arc::new(store.clone()),
            DispatchOptions::default(),
        )
    }

    #[tokio::test]
    async fn saves_events_with_sequential_versions() {
        let store = InMemoryAggregateStore::new();
        let account = AggregateId::new();

        sender(&store)
            .send::<_, Account>(Deposit {
                account,
                amounts: vec![10, 20, 30],
            })
            .await
            .unwrap();

        let events = store.events_for(account).await;
        let versions: Vec<_> = events.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, [1, 2, 3]);
        assert!(events.iter().all(|e| e.event_type == "Deposited"));
        assert_eq!(events[1].payload, serde_json::json!({"amount": 20}));
        assert_eq!(store.version_of(account).await, Some(Version::new(3)));
        assert_eq!(
            store.aggregate(account).await.unwrap().state["balance"],
            60
        );
    }

    #[tokio::test]
    async fn events_share_the_command_id() {
        let store = InMemoryAggregateStore::new();
        let account = AggregateId::new();

        sender(&store)
            .send::<_, Account>(Deposit {
                account,
                amounts: vec![1, 2],
            })
            .await
            .unwrap();

        let events = store.events_for(account).await;
        let commands = store.commands_for(account).await;
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].command_type, "Deposit");
        assert!(
            events
                .iter()
                .all(|e| e.command_id == Some(commands[0].command_id))
        );
    }

    #[derive(Clone, Default)]
    struct SeenMetadata(Arc<std::sync::Mutex<Vec<EventMetadata>>>);

    #[async_trait]
    impl crate::publisher::EventSubscriber<Deposited> for SeenMetadata {
        async fn handle(
            &self,
            _event: &Deposited,
            metadata: Option<&EventMetadata>,
        ) -> std::result::Result<(), BoxError> {
            self.0.lock().unwrap().extend(metadata.cloned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn stored_envelopes_match_published_metadata() {
        let store = InMemoryAggregateStore::new();
        let seen = SeenMetadata::default();
        let registry = Arc::new(
            HandlerRegistry::builder()
                .domain_command::<Deposit, Account, _>(DepositHandler)
                .subscriber::<Deposited, _>(seen.clone())
                .build(),
        );
        let sender = DomainCommandSender::new(
            registry.clone(),
            Arc::new(RegistryPublisher::new(registry)),
            Arc::new(store.clone()),
            DispatchOptions::default(),
        );
        let account = AggregateId::new();

        sender
            .send::<_, Account>(Deposit {
                account,
                amounts: vec![5, 6],
            })
            .await
            .unwrap();

        let published = seen.0.lock().unwrap().clone();
        let stored = store.events_for(account).await;
        assert_eq!(published.len(), stored.len());
        for (meta, envelope) in published.iter().zip(&stored) {
            assert_eq!(envelope.event_id, meta.event_id);
            assert_eq!(envelope.command_id, Some(meta.command_id));
            assert_eq!(envelope.version, meta.version);
            assert_eq!(envelope.timestamp, meta.timestamp);
            assert_eq!(envelope.aggregate_type, meta.aggregate_type);
        }
    }

    #[tokio::test]
    async fn nil_aggregate_id_is_rejected() {
        let store = InMemoryAggregateStore::new();

        let err = sender(&store)
            .send::<_, Account>(Deposit {
                account: AggregateId::from_uuid(uuid::Uuid::nil()),
                amounts: vec![1],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Argument("aggregate id")));
        assert_eq!(store.save_count().await, 0);
    }

    #[tokio::test]
    async fn store_failure_is_propagated() {
        let store = InMemoryAggregateStore::new();
        store.set_fail_on_save(true).await;

        let err = sender(&store)
            .send::<_, Account>(Deposit {
                account: AggregateId::new(),
                amounts: vec![1],
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Persistence(StoreError::Unavailable(_))
        ));
    }
}
