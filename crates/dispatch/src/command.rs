//! Plain command sending.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::{BoxError, DispatchError, Result, record_failure};
use crate::event::{Event, EventFactory, short_type_name};
use crate::options::DispatchOptions;
use crate::publisher::{EventPublisher, publish_all};
use crate::registry::{CommandContract, Contract, HandlerResolver};

/// An imperative request to change state.
///
/// Commands are named in imperative form and have exactly one handler.
pub trait Command: Send + Sync + 'static {
    /// Per-command override of [`DispatchOptions::publish_events`].
    fn publish_events(&self) -> Option<bool> {
        None
    }
}

/// Handles one command type and reports the events it produced.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn handle(&self, command: &C) -> std::result::Result<Vec<Box<dyn Event>>, BoxError>;
}

/// Sends commands to their handler and publishes the resulting events.
pub struct CommandSender<R> {
    resolver: R,
    publisher: Arc<dyn EventPublisher>,
    factory: EventFactory,
    options: DispatchOptions,
}

impl<R: HandlerResolver> CommandSender<R> {
    pub fn new(resolver: R, publisher: Arc<dyn EventPublisher>, options: DispatchOptions) -> Self {
        Self {
            resolver,
            publisher,
            factory: EventFactory::new(),
            options,
        }
    }

    /// Sends a command.
    ///
    /// Returns once the handler finished and every produced event was
    /// delivered to all of its subscribers.
    #[tracing::instrument(skip(self, command), fields(command_type = short_type_name::<C>()))]
    pub async fn send<C: Command>(&self, command: C) -> Result<()> {
        let started = Instant::now();
        let result = self.execute(&command).await.inspect_err(record_failure);

        metrics::counter!("dispatch_commands_total", "kind" => "command").increment(1);
        metrics::histogram!("dispatch_command_duration_seconds", "kind" => "command")
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Sends a command that may be absent.
    ///
    /// An absent command fails with [`DispatchError::Argument`] before any
    /// handler is resolved.
    pub async fn send_optional<C: Command>(&self, command: Option<C>) -> Result<()> {
        let command = command
            .ok_or(DispatchError::Argument("command"))
            .inspect_err(record_failure)?;
        self.send(command).await
    }

    async fn execute<C: Command>(&self, command: &C) -> Result<()> {
        let handler = self.resolver.resolve::<CommandContract<C>>()?;
        let events = handler
            .handle(command)
            .await
            .map_err(|source| DispatchError::Handler {
                contract: CommandContract::<C>::describe(),
                source,
            })?;

        let publish = command
            .publish_events()
            .unwrap_or(self.options.publish_events);
        let published = publish_all(&self.factory, &*self.publisher, events, publish).await?;

        tracing::debug!(events = published.len(), published = publish, "command handled");
        Ok(())
    }
}
