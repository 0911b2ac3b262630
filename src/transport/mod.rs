//! Transport routing
//!
//! A client's live connection is held by at most one of several named
//! transports (TCP, WebSocket, IPC, ...). The [`TransportRouter`] queries them
//! in priority order and forwards data frames and liveness probes to whichever
//! one currently holds the client.
//!
//! ```text
//!   Client ──send(id, bytes)──► TransportRouter ──► [ws] has_client? no
//!                                                  ──► [tcp] has_client? yes ──► socket
//!
//!   Client ──ping(id, cb)────► TransportRouter ──► pending[id] = (ticket, cb, deadline)
//!                                                  ──► transport.ping(id)
//!   transport pong frame ────► resolve_pong(id) ──► cb()
//! ```

pub mod channel;
pub mod error;
pub(crate) mod pending;
pub mod router;

use bytes::Bytes;

use crate::session::ClientId;

pub use channel::{ChannelTransport, Frame};
pub use error::TransportError;
pub use pending::{ProbeCallback, ProbeTicket};
pub use router::TransportRouter;

/// A physical transport that may hold live client connections
///
/// Implementations must not block: `send` and `ping` enqueue and return.
pub trait Transport: Send + Sync {
    /// Short name used in logs (e.g. "websocket")
    fn name(&self) -> &str;

    /// Whether this transport currently holds a live connection for `id`
    fn has_client(&self, id: &ClientId) -> bool;

    /// Queue a data frame for the client
    fn send(&self, id: &ClientId, payload: Bytes) -> Result<(), TransportError>;

    /// Queue an out-of-band liveness probe; the reply arrives later through
    /// [`TransportRouter::resolve_pong`]
    fn ping(&self, id: &ClientId) -> Result<(), TransportError>;
}
