//! In-process CQRS dispatch core.
//!
//! This crate routes the messages of a CQRS application to their handlers:
//! - [`Command`]s go to exactly one [`CommandHandler`]; the events it returns
//!   are published to every [`EventSubscriber`] of their concrete type
//! - [`DomainCommand`]s go to a [`DomainCommandHandler`] that returns the
//!   changed [`AggregateRoot`]; its events are published and the aggregate is
//!   saved to an [`AggregateStore`](aggregate_store::AggregateStore) only
//!   once publication succeeded
//! - [`Query`]s go to the [`QueryHandler`] registered for their result type
//! - [`BusMessage`]s are handed to a [`MessageTransport`](message_bus::MessageTransport)
//!   addressed to a queue or topic
//!
//! Handlers are looked up through a [`HandlerResolver`], normally a
//! [`HandlerRegistry`]. [`Dispatcher`] bundles all of the above behind one
//! facade.

pub mod aggregate;
pub mod bus;
pub mod command;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod event;
pub mod options;
pub mod publisher;
pub mod query;
pub mod registry;

pub use aggregate::{AggregateRoot, UncommittedEvents};
pub use bus::{BusMessage, BusMessageDispatcher, BusMessageRoute, TransportRoute};
pub use command::{Command, CommandHandler, CommandSender};
pub use dispatcher::{BlockingDispatcher, Dispatcher};
pub use domain::{DomainCommand, DomainCommandHandler, DomainCommandSender};
pub use error::{BoxError, DispatchError, Result};
pub use event::{ConcreteEvent, DomainEvent, Event, EventAny, EventFactory, EventMetadata};
pub use options::DispatchOptions;
pub use publisher::{EventPublisher, EventSubscriber, RegistryPublisher};
pub use query::{Query, QueryHandler, QueryProcessor};
pub use registry::{
    BusMessageContract, CommandContract, Contract, DomainCommandContract, HandlerRegistry,
    HandlerRegistryBuilder, HandlerResolver, QueryContract,
};

pub use aggregate_store::Version;
pub use common::{AggregateId, CommandId, EventId};
