//! Outbound messaging contract for the dispatch core.
//!
//! Bus messages leave the process through a [`MessageTransport`], addressed
//! to a named queue (point-to-point) or topic (fan-out). Concrete broker
//! clients live outside this workspace; [`InMemoryTransport`] records what
//! was sent.

pub mod error;
pub mod memory;
pub mod message;
pub mod transport;

pub use error::{Result, TransportError};
pub use memory::InMemoryTransport;
pub use message::{Destination, MessageId, OutboundMessage};
pub use transport::MessageTransport;
