//! Bus message dispatch.
//!
//! Bus messages are not handled in-process. Each message type is routed to
//! one queue or topic and handed to a [`MessageTransport`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use message_bus::{Destination, MessageTransport, OutboundMessage, TransportError};
use serde::Serialize;

use crate::error::{DispatchError, Result, record_failure};
use crate::event::short_type_name;
use crate::registry::{BusMessageContract, HandlerResolver};

/// A message sent to another process through a queue or topic.
pub trait BusMessage: Serialize + Send + Sync + 'static {
    /// Type name the receiver routes on.
    fn message_type(&self) -> &'static str {
        short_type_name::<Self>()
    }

    /// Earliest time the message should be delivered.
    fn scheduled_enqueue_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Broker-level properties attached to the message.
    fn properties(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Forwards one bus message type to its destination.
#[async_trait]
pub trait BusMessageRoute<M: BusMessage>: Send + Sync {
    async fn forward(&self, message: &M) -> std::result::Result<(), TransportError>;
}

/// Route that encodes messages as JSON and sends them over a transport.
pub struct TransportRoute {
    destination: Destination,
    transport: Arc<dyn MessageTransport>,
}

impl TransportRoute {
    pub fn new(destination: Destination, transport: Arc<dyn MessageTransport>) -> Self {
        Self {
            destination,
            transport,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }
}

#[async_trait]
impl<M: BusMessage> BusMessageRoute<M> for TransportRoute {
    async fn forward(&self, message: &M) -> std::result::Result<(), TransportError> {
        let outbound = message.properties().into_iter().fold(
            OutboundMessage::json(message.message_type(), self.destination.clone(), message)?
                .scheduled_at(message.scheduled_enqueue_time()),
            |outbound, (key, value)| outbound.with_property(key, value),
        );
        tracing::debug!(
            message_id = %outbound.message_id,
            destination = %self.destination,
            "forwarding bus message"
        );
        self.transport.send(outbound).await
    }
}

/// Dispatches bus messages to their registered route.
pub struct BusMessageDispatcher<R> {
    resolver: R,
}

impl<R: HandlerResolver> BusMessageDispatcher<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Dispatches a message.
    ///
    /// Succeeds once the transport accepted the message; delivery to the
    /// receiver is not awaited.
    #[tracing::instrument(skip(self, message), fields(message_type = message.message_type()))]
    pub async fn dispatch<M: BusMessage>(&self, message: M) -> Result<()> {
        let result = self.execute(&message).await.inspect_err(record_failure);
        metrics::counter!("dispatch_bus_messages_total", "message_type" => message.message_type())
            .increment(1);
        result
    }

    /// Dispatches a message that may be absent.
    pub async fn dispatch_optional<M: BusMessage>(&self, message: Option<M>) -> Result<()> {
        let message = message
            .ok_or(DispatchError::Argument("message"))
            .inspect_err(record_failure)?;
        self.dispatch(message).await
    }

    async fn execute<M: BusMessage>(&self, message: &M) -> Result<()> {
        let route = self.resolver.resolve::<BusMessageContract<M>>()?;
        route.forward(message).await?;
        Ok(())
    }
}
