//! Priority-ordered transport router

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use super::error::TransportError;
use super::pending::{PendingProbes, ProbeCallback, ProbeTicket};
use super::Transport;
use crate::session::ClientId;
use crate::stats::{RouterStats, RouterStatsSnapshot};

/// Routes frames and probes to whichever transport holds a client
pub struct TransportRouter {
    /// Registered transports, highest priority first
    transports: RwLock<Vec<Arc<dyn Transport>>>,

    /// Outstanding probes, at most one per client
    pending: Mutex<PendingProbes>,

    /// How long an unanswered probe is kept before it is reclaimed
    probe_expiry: Duration,

    stats: RouterStats,
}

impl TransportRouter {
    /// Create a router with no transports
    pub fn new(probe_expiry: Duration) -> Self {
        Self {
            transports: RwLock::new(Vec::new()),
            pending: Mutex::new(PendingProbes::default()),
            probe_expiry,
            stats: RouterStats::new(),
        }
    }

    /// Append a transport; earlier transports take priority
    pub fn add_transport(&self, transport: Arc<dyn Transport>) {
        tracing::info!(transport = transport.name(), "Transport registered");
        self.transports.write().push(transport);
    }

    /// Names of registered transports in priority order
    pub fn transport_names(&self) -> Vec<String> {
        self.transports
            .read()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// First transport, by priority, that holds the client
    fn holder(&self, id: &ClientId) -> Option<Arc<dyn Transport>> {
        self.transports
            .read()
            .iter()
            .find(|t| t.has_client(id))
            .cloned()
    }

    /// Whether any transport holds a live connection for the client
    pub fn has_client(&self, id: &ClientId) -> bool {
        self.holder(id).is_some()
    }

    /// Forward a data frame to the client's transport
    ///
    /// Failures are counted and logged; callers on the delivery path treat
    /// them as fire-and-forget.
    pub fn send(&self, id: &ClientId, payload: Bytes) -> Result<(), TransportError> {
        let Some(transport) = self.holder(id) else {
            self.stats.record_dropped_send();
            tracing::debug!(client_id = %id, "No transport holds client, frame dropped");
            return Err(TransportError::Unavailable(id.clone()));
        };

        match transport.send(id, payload) {
            Ok(()) => {
                self.stats.record_sent();
                Ok(())
            }
            Err(e) => {
                self.stats.record_dropped_send();
                tracing::warn!(
                    client_id = %id,
                    transport = transport.name(),
                    error = %e,
                    "Transport rejected frame"
                );
                Err(e)
            }
        }
    }

    /// Send a liveness probe; `callback` runs when the pong arrives
    ///
    /// A newer probe for the same client replaces the older pending one.
    /// The returned ticket cancels this probe and no other.
    pub fn ping(
        &self,
        id: &ClientId,
        callback: ProbeCallback,
    ) -> Result<ProbeTicket, TransportError> {
        let Some(transport) = self.holder(id) else {
            self.stats.record_failed_ping();
            tracing::debug!(client_id = %id, "No transport holds client, probe not sent");
            return Err(TransportError::Unavailable(id.clone()));
        };

        let deadline = Instant::now() + self.probe_expiry;
        let ticket = self.pending.lock().insert(id.clone(), callback, deadline);

        if let Err(e) = transport.ping(id) {
            self.pending.lock().cancel(id, ticket);
            self.stats.record_failed_ping();
            tracing::warn!(
                client_id = %id,
                transport = transport.name(),
                error = %e,
                "Transport rejected probe"
            );
            return Err(e);
        }

        self.stats.record_ping();
        Ok(ticket)
    }

    /// Resolve the client's pending probe. Returns `false` if none was pending.
    pub fn resolve_pong(&self, id: &ClientId) -> bool {
        // Taken under the lock, invoked after it is released
        let callback = self.pending.lock().take(id);
        match callback {
            Some(callback) => {
                self.stats.record_pong();
                callback();
                true
            }
            None => {
                tracing::trace!(client_id = %id, "Pong without pending probe");
                false
            }
        }
    }

    /// Drop a pending probe without running it
    ///
    /// Has no effect once a newer probe for the same client replaced it.
    pub fn cancel_probe(&self, id: &ClientId, ticket: ProbeTicket) -> bool {
        self.pending.lock().cancel(id, ticket)
    }

    /// Number of probes waiting for a pong
    pub fn pending_probes(&self) -> usize {
        self.pending.lock().len()
    }

    /// Reclaim probes whose deadline has passed
    pub fn reclaim_expired(&self) -> usize {
        let reclaimed = self.pending.lock().reclaim_expired(Instant::now());
        if reclaimed > 0 {
            self.stats.record_expired_probes(reclaimed);
            tracing::debug!(reclaimed, "Expired probes reclaimed");
        }
        reclaimed
    }

    /// Spawn a background task that reclaims expired probes
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let router = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(router) = router.upgrade() else {
                    break;
                };
                router.reclaim_expired();
            }
        })
    }

    /// Routing counters
    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }
}
