//! Handler resolution.
//!
//! Every operation of the dispatch core names a *contract*: a zero-sized
//! marker type such as [`CommandContract<C>`] whose `TypeId` identifies the
//! handler kind and the message type together. A [`HandlerResolver`] maps a
//! contract to exactly one shared handler.
//!
//! [`HandlerRegistry`] is the default resolver. It is assembled once through
//! [`HandlerRegistryBuilder`] and is immutable afterwards, so it can be shared
//! freely between tasks.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use message_bus::{Destination, MessageTransport};

use crate::bus::{BusMessage, BusMessageRoute, TransportRoute};
use crate::command::{Command, CommandHandler};
use crate::domain::{DomainCommand, DomainCommandHandler};
use crate::error::{DispatchError, Result};
use crate::event::{Event, short_type_name};
use crate::publisher::{ErasedSubscriber, EventSubscriber, TypedSubscriber};
use crate::query::{Query, QueryHandler};

/// Identifies one kind of handler.
pub trait Contract: 'static {
    /// The handler object the contract resolves to.
    type Handler: ?Sized + Send + Sync + 'static;

    /// Human readable contract name used in errors.
    fn describe() -> String;
}

/// Contract of the handler for command `C`.
pub struct CommandContract<C>(PhantomData<fn() -> C>);

impl<C: Command> Contract for CommandContract<C> {
    type Handler = dyn CommandHandler<C>;

    fn describe() -> String {
        format!("command handler of {}", short_type_name::<C>())
    }
}

/// Contract of the handler for domain command `C` acting on aggregate `A`.
pub struct DomainCommandContract<C, A>(PhantomData<fn() -> (C, A)>);

impl<C: DomainCommand, A: Send + 'static> Contract for DomainCommandContract<C, A> {
    type Handler = dyn DomainCommandHandler<C, A>;

    fn describe() -> String {
        format!(
            "domain command handler of {} for {}",
            short_type_name::<C>(),
            short_type_name::<A>()
        )
    }
}

/// Contract of the handler answering query `Q` with `R`.
pub struct QueryContract<Q, R>(PhantomData<fn() -> (Q, R)>);

impl<Q: Query, R: Send + 'static> Contract for QueryContract<Q, R> {
    type Handler = dyn QueryHandler<Q, R>;

    fn describe() -> String {
        format!(
            "query handler of {} returning {}",
            short_type_name::<Q>(),
            short_type_name::<R>()
        )
    }
}

/// Contract of the bus route for message `M`.
pub struct BusMessageContract<M>(PhantomData<fn() -> M>);

impl<M: BusMessage> Contract for BusMessageContract<M> {
    type Handler = dyn BusMessageRoute<M>;

    fn describe() -> String {
        format!("bus message route of {}", short_type_name::<M>())
    }
}

/// Maps a contract to its handler.
///
/// Resolution fails with [`DispatchError::Resolution`] when nothing is
/// registered and with [`DispatchError::AmbiguousResolution`] when more than
/// one handler is.
pub trait HandlerResolver: Send + Sync {
    fn resolve<K: Contract>(&self) -> Result<Arc<K::Handler>>;
}

impl<T: HandlerResolver> HandlerResolver for Arc<T> {
    fn resolve<K: Contract>(&self) -> Result<Arc<K::Handler>> {
        (**self).resolve::<K>()
    }
}

struct Registration {
    contract: String,
    // Each entry is an `Arc<K::Handler>` for the contract `K` this slot is keyed by.
    handlers: Vec<Box<dyn Any + Send + Sync>>,
}

/// Immutable map from contracts to handlers and from event types to subscribers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TypeId, Registration>,
    subscribers: HashMap<TypeId, Vec<Arc<dyn ErasedSubscriber>>>,
}

impl HandlerRegistry {
    /// Starts assembling a registry.
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Returns the number of handlers registered for contract `K`.
    pub fn handler_count<K: Contract>(&self) -> usize {
        self.handlers
            .get(&TypeId::of::<K>())
            .map_or(0, |r| r.handlers.len())
    }

    /// Returns the number of subscribers registered for event `E`.
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.subscribers
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Subscribers of the concrete event type `type_id`, in registration order.
    pub(crate) fn subscribers_for(&self, type_id: TypeId) -> &[Arc<dyn ErasedSubscriber>] {
        self.subscribers
            .get(&type_id)
            .map_or(&[], Vec::as_slice)
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve<K: Contract>(&self) -> Result<Arc<K::Handler>> {
        let registration =
            self.handlers
                .get(&TypeId::of::<K>())
                .ok_or_else(|| DispatchError::Resolution {
                    contract: K::describe(),
                })?;

        match registration.handlers.as_slice() {
            [handler] => handler
                .downcast_ref::<Arc<K::Handler>>()
                .cloned()
                .ok_or_else(|| DispatchError::Resolution {
                    contract: registration.contract.clone(),
                }),
            [] => Err(DispatchError::Resolution {
                contract: registration.contract.clone(),
            }),
            handlers => Err(DispatchError::AmbiguousResolution {
                contract: registration.contract.clone(),
                count: handlers.len(),
            }),
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut contracts: Vec<_> = self
            .handlers
            .values()
            .map(|r| (r.contract.as_str(), r.handlers.len()))
            .collect();
        contracts.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("contracts", &contracts)
            .field(
                "subscribers",
                &self.subscribers.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

/// Collects handlers and subscribers into a [`HandlerRegistry`].
///
/// Registering twice for the same contract is allowed here; resolving that
/// contract later reports the ambiguity.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    registry: HandlerRegistry,
}

impl HandlerRegistryBuilder {
    /// Registers a shared handler for contract `K`.
    pub fn register<K: Contract>(mut self, handler: Arc<K::Handler>) -> Self {
        self.registry
            .handlers
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Registration {
                contract: K::describe(),
                handlers: Vec::new(),
            })
            .handlers
            .push(Box::new(handler));
        self
    }

    /// Registers the handler of command `C`.
    pub fn command<C, H>(self, handler: H) -> Self
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let handler: Arc<dyn CommandHandler<C>> = Arc::new(handler);
        self.register::<CommandContract<C>>(handler)
    }

    /// Registers the handler of domain command `C` on aggregate `A`.
    pub fn domain_command<C, A, H>(self, handler: H) -> Self
    where
        C: DomainCommand,
        A: Send + 'static,
        H: DomainCommandHandler<C, A> + 'static,
    {
        let handler: Arc<dyn DomainCommandHandler<C, A>> = Arc::new(handler);
        self.register::<DomainCommandContract<C, A>>(handler)
    }

    /// Registers the handler answering query `Q` with `R`.
    pub fn query<Q, R, H>(self, handler: H) -> Self
    where
        Q: Query,
        R: Send + 'static,
        H: QueryHandler<Q, R> + 'static,
    {
        let handler: Arc<dyn QueryHandler<Q, R>> = Arc::new(handler);
        self.register::<QueryContract<Q, R>>(handler)
    }

    /// Registers a custom route for bus message `M`.
    pub fn bus_route<M, H>(self, route: H) -> Self
    where
        M: BusMessage,
        H: BusMessageRoute<M> + 'static,
    {
        let route: Arc<dyn BusMessageRoute<M>> = Arc::new(route);
        self.register::<BusMessageContract<M>>(route)
    }

    /// Routes bus message `M` to `destination` over `transport`.
    pub fn bus_message<M: BusMessage>(
        self,
        destination: Destination,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        self.bus_route::<M, _>(TransportRoute::new(destination, transport))
    }

    /// Subscribes to event `E`. Subscribers run in registration order.
    pub fn subscriber<E, S>(mut self, subscriber: S) -> Self
    where
        E: Event,
        S: EventSubscriber<E> + 'static,
    {
        self.registry
            .subscribers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Arc::new(TypedSubscriber::new(subscriber)));
        self
    }

    pub fn build(self) -> HandlerRegistry {
        tracing::debug!(
            contracts = self.registry.handlers.len(),
            event_types = self.registry.subscribers.len(),
            "handler registry built"
        );
        self.registry
    }
}
