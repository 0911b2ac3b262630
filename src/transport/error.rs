//! Transport error types

use crate::session::ClientId;

/// Error type for routing a frame to a client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No registered transport currently holds a connection for the client
    #[error("no transport holds a connection for client {0}")]
    Unavailable(ClientId),

    /// The holding transport's connection is closed
    #[error("connection for client {0} is closed")]
    Closed(ClientId),

    /// The holding transport cannot accept more outbound frames right now
    #[error("outbound queue for client {0} is full")]
    Backpressure(ClientId),
}
