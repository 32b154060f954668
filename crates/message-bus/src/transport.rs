use async_trait::async_trait;

use crate::{OutboundMessage, Result};

/// Sends messages to an external queue or topic.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Hands one message to the broker named by its destination.
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}
