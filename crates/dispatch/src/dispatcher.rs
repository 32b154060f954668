//! The dispatcher facade.

use std::sync::Arc;

use aggregate_store::AggregateStore;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::aggregate::AggregateRoot;
use crate::bus::{BusMessage, BusMessageDispatcher};
use crate::command::{Command, CommandSender};
use crate::domain::{DomainCommand, DomainCommandSender};
use crate::error::{DispatchError, Result, record_failure};
use crate::event::{Event, EventFactory};
use crate::options::DispatchOptions;
use crate::publisher::{EventPublisher, RegistryPublisher};
use crate::query::{Query, QueryProcessor};
use crate::registry::{HandlerRegistry, HandlerResolver};

/// Single entry point for commands, domain commands, events, queries and bus
/// messages.
///
/// The dispatcher adds no behaviour of its own; each call delegates to the
/// matching component and returns its outcome unchanged.
pub struct Dispatcher<R = Arc<HandlerRegistry>> {
    commands: CommandSender<R>,
    domain_commands: DomainCommandSender<R>,
    queries: QueryProcessor<R>,
    bus_messages: BusMessageDispatcher<R>,
    publisher: Arc<dyn EventPublisher>,
    factory: EventFactory,
}

impl Dispatcher<Arc<HandlerRegistry>> {
    /// Builds a dispatcher whose handlers and subscribers all come from `registry`.
    pub fn new(
        registry: HandlerRegistry,
        store: Arc<dyn AggregateStore>,
        options: DispatchOptions,
    ) -> Self {
        let registry = Arc::new(registry);
        let publisher = Arc::new(RegistryPublisher::new(registry.clone()));
        Self::with_parts(registry, publisher, store, options)
    }
}

impl<R: HandlerResolver + Clone> Dispatcher<R> {
    /// Builds a dispatcher from a custom resolver and publisher.
    pub fn with_parts(
        resolver: R,
        publisher: Arc<dyn EventPublisher>,
        store: Arc<dyn AggregateStore>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            commands: CommandSender::new(resolver.clone(), publisher.clone(), options),
            domain_commands: DomainCommandSender::new(
                resolver.clone(),
                publisher.clone(),
                store,
                options,
            ),
            queries: QueryProcessor::new(resolver.clone()),
            bus_messages: BusMessageDispatcher::new(resolver),
            publisher,
            factory: EventFactory::new(),
        }
    }
}

impl<R: HandlerResolver> Dispatcher<R> {
    /// Sends a command and publishes the events it produced.
    pub async fn send<C: Command>(&self, command: C) -> Result<()> {
        self.commands.send(command).await
    }

    pub async fn send_optional<C: Command>(&self, command: Option<C>) -> Result<()> {
        self.commands.send_optional(command).await
    }

    /// Sends a domain command, publishes its events and saves aggregate `A`.
    pub async fn send_domain<C: DomainCommand, A: AggregateRoot>(&self, command: C) -> Result<()> {
        self.domain_commands.send::<C, A>(command).await
    }

    pub async fn send_domain_optional<C: DomainCommand, A: AggregateRoot>(
        &self,
        command: Option<C>,
    ) -> Result<()> {
        self.domain_commands.send_optional::<C, A>(command).await
    }

    /// Publishes a single event to its subscribers.
    pub async fn publish<E: Event>(&self, event: E) -> Result<()> {
        let concrete = self
            .factory
            .concretize(Box::new(event))
            .inspect_err(record_failure)?;
        self.publisher
            .publish(&concrete)
            .await
            .inspect_err(record_failure)
    }

    /// Runs a query and returns its result.
    pub async fn process<Q: Query, T: Send + 'static>(&self, query: Q) -> Result<T> {
        self.queries.process::<Q, T>(query).await
    }

    pub async fn process_optional<Q: Query, T: Send + 'static>(
        &self,
        query: Option<Q>,
    ) -> Result<T> {
        self.queries.process_optional::<Q, T>(query).await
    }

    /// Hands a bus message to the transport registered for its type.
    pub async fn dispatch_bus_message<M: BusMessage>(&self, message: M) -> Result<()> {
        self.bus_messages.dispatch(message).await
    }

    pub async fn dispatch_bus_message_optional<M: BusMessage>(
        &self,
        message: Option<M>,
    ) -> Result<()> {
        self.bus_messages.dispatch_optional(message).await
    }
}

/// Synchronous front for a [`Dispatcher`].
///
/// Owns a current-thread runtime and blocks the caller until each operation
/// completes.
///
/// # Errors
///
/// Every operation fails with [`DispatchError::BlockingInAsync`] when called
/// from a thread that is already running inside a tokio runtime.
pub struct BlockingDispatcher<R = Arc<HandlerRegistry>> {
    dispatcher: Dispatcher<R>,
    // Taken on drop so the runtime can be released from any context.
    runtime: Option<Runtime>,
}

impl<R: HandlerResolver> BlockingDispatcher<R> {
    pub fn new(dispatcher: Dispatcher<R>) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            dispatcher,
            runtime: Some(runtime),
        })
    }

    /// Returns the wrapped async dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<R> {
        &self.dispatcher
    }

    fn block_on<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        match (&self.runtime, Handle::try_current()) {
            (Some(runtime), Err(_)) => runtime.block_on(operation),
            _ => {
                let error = DispatchError::BlockingInAsync;
                record_failure(&error);
                Err(error)
            }
        }
    }

    pub fn send<C: Command>(&self, command: C) -> Result<()> {
        self.block_on(self.dispatcher.send(command))
    }

    pub fn send_optional<C: Command>(&self, command: Option<C>) -> Result<()> {
        self.block_on(self.dispatcher.send_optional(command))
    }

    pub fn send_domain<C: DomainCommand, A: AggregateRoot>(&self, command: C) -> Result<()> {
        self.block_on(self.dispatcher.send_domain::<C, A>(command))
    }

    pub fn send_domain_optional<C: DomainCommand, A: AggregateRoot>(
        &self,
        command: Option<C>,
    ) -> Result<()> {
        self.block_on(self.dispatcher.send_domain_optional::<C, A>(command))
    }

    pub fn publish<E: Event>(&self, event: E) -> Result<()> {
        self.block_on(self.dispatcher.publish(event))
    }

    pub fn process<Q: Query, T: Send + 'static>(&self, query: Q) -> Result<T> {
        self.block_on(self.dispatcher.process::<Q, T>(query))
    }

    pub fn process_optional<Q: Query, T: Send + 'static>(&self, query: Option<Q>) -> Result<T> {
        self.block_on(self.dispatcher.process_optional::<Q, T>(query))
    }

    pub fn dispatch_bus_message<M: BusMessage>(&self, message: M) -> Result<()> {
        self.block_on(self.dispatcher.dispatch_bus_message(message))
    }

    pub fn dispatch_bus_message_optional<M: BusMessage>(&self, message: Option<M>) -> Result<()> {
        self.block_on(self.dispatcher.dispatch_bus_message_optional(message))
    }
}

impl<R> Drop for BlockingDispatcher<R> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
