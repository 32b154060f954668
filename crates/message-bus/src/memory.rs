//! In-memory transport that records every message it accepts.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::{Destination, MessageTransport, OutboundMessage, Result, TransportError};

#[derive(Debug, Default)]
struct InMemoryTransportState {
    sent: Vec<OutboundMessage>,
    fail_on_send: bool,
}

/// In-memory transport for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<RwLock<InMemoryTransportState>>,
}

impl InMemoryTransport {
    /// Creates a new in-memory transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the transport to refuse subsequent sends.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns every accepted message in send order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state.read().unwrap().sent.clone()
    }

    /// Returns the accepted messages addressed to `destination`.
    pub fn sent_to(&self, destination: &Destination) -> Vec<OutboundMessage> {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter(|m| &m.destination == destination)
            .cloned()
            .collect()
    }

    /// Returns the number of accepted messages.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(TransportError::ConnectionFailed {
                destination: message.destination,
                reason: "transport offline".to_string(),
            });
        }

        tracing::debug!(
            message_id = %message.message_id,
            destination = %message.destination,
            "message accepted"
        );
        metrics::counter!("bus_messages_sent_total").increment(1);
        state.sent.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(destination: Destination) -> OutboundMessage {
        OutboundMessage::json("Ping", destination, &serde_json::json!({"n": 1})).unwrap()
    }

    #[tokio::test]
    async fn records_sent_messages_per_destination() {
        let transport = InMemoryTransport::new();

        transport.send(message(Destination::queue("q"))).await.unwrap();
        transport.send(message(Destination::topic("t"))).await.unwrap();
        transport.send(message(Destination::queue("q"))).await.unwrap();

        assert_eq!(transport.sent_count(), 3);
        assert_eq!(transport.sent_to(&Destination::queue("q")).len(), 2);
        assert_eq!(transport.sent_to(&Destination::topic("t")).len(), 1);
    }

    #[tokio::test]
    async fn fail_on_send_refuses_message() {
        let transport = InMemoryTransport::new();
        transport.set_fail_on_send(true);

        let result = transport.send(message(Destination::queue("q"))).await;

        assert!(matches!(
            result,
            Err(TransportError::ConnectionFailed { .. })
        ));
        assert_eq!(transport.sent_count(), 0);
    }
}
