//! In-process channel transport
//!
//! Each attached client gets a bounded `mpsc` queue of [`Frame`]s; the
//! connection task on the other end drains it into its socket. Useful as the
//! glue between a socket task and the router, and in tests.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::error::TransportError;
use super::Transport;
use crate::session::ClientId;

/// Frame queued for a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Encoded record
    Data(Bytes),
    /// Liveness probe; the connection answers by calling `resolve_pong`
    Ping,
}

/// Transport backed by one bounded channel per client
pub struct ChannelTransport {
    name: String,
    clients: Mutex<HashMap<ClientId, mpsc::Sender<Frame>>>,
}

impl ChannelTransport {
    /// Create a transport with no attached clients
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a client connection, replacing any previous one
    ///
    /// Returns the receiving end the connection task drains.
    pub fn attach(&self, id: ClientId, capacity: usize) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        if self.clients.lock().insert(id.clone(), tx).is_some() {
            tracing::debug!(transport = %self.name, client_id = %id, "Connection replaced");
        }
        rx
    }

    /// Detach a client connection
    pub fn detach(&self, id: &ClientId) -> bool {
        self.clients.lock().remove(id).is_some()
    }

    /// Number of attached connections
    pub fn connection_count(&self) -> usize {
        self.clients.lock().len()
    }

    fn enqueue(&self, id: &ClientId, frame: Frame) -> Result<(), TransportError> {
        let mut clients = self.clients.lock();
        let Some(tx) = clients.get(id) else {
            return Err(TransportError::Unavailable(id.clone()));
        };

        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::Backpressure(id.clone())),
            Err(TrySendError::Closed(_)) => {
                clients.remove(id);
                Err(TransportError::Closed(id.clone()))
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_client(&self, id: &ClientId) -> bool {
        self.clients
            .lock()
            .get(id)
            .is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, id: &ClientId, payload: Bytes) -> Result<(), TransportError> {
        self.enqueue(id, Frame::Data(payload))
    }

    fn ping(&self, id: &ClientId) -> Result<(), TransportError> {
        self.enqueue(id, Frame::Ping)
    }
}
