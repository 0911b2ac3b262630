//! Statistics and metrics for the broker core

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::session::{ClientId, ClientState};

/// Routing counters kept by the transport router
///
/// Delivery is fire-and-forget; these counters are the only place a frame
/// that found no live transport shows up.
#[derive(Debug, Default)]
pub struct RouterStats {
    sent: AtomicU64,
    dropped_sends: AtomicU64,
    pings: AtomicU64,
    failed_pings: AtomicU64,
    pongs: AtomicU64,
    expired_probes: AtomicU64,
}

impl RouterStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_send(&self) {
        self.dropped_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ping(&self) {
        self.pings.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_ping(&self) {
        self.failed_pings.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pong(&self) {
        self.pongs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expired_probes(&self, count: usize) {
        self.expired_probes
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            dropped_sends: self.dropped_sends.load(Ordering::Relaxed),
            pings: self.pings.load(Ordering::Relaxed),
            failed_pings: self.failed_pings.load(Ordering::Relaxed),
            pongs: self.pongs.load(Ordering::Relaxed),
            expired_probes: self.expired_probes.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`RouterStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStatsSnapshot {
    /// Data frames handed to a transport
    pub sent: u64,
    /// Data frames with no live transport, or rejected by the transport
    pub dropped_sends: u64,
    /// Probes handed to a transport
    pub pings: u64,
    /// Probes with no live transport, or rejected by the transport
    pub failed_pings: u64,
    /// Probes resolved by a pong
    pub pongs: u64,
    /// Probes reclaimed after their deadline passed
    pub expired_probes: u64,
}

/// Per-client statistics
#[derive(Debug, Clone)]
pub struct ClientStats {
    pub id: ClientId,
    pub name: String,
    pub state: ClientState,
    pub registered_at: SystemTime,
    /// Time since the last sign of life (None before the first stamp)
    pub since_last_sign_of_life: Option<Duration>,
    /// Topics with an underlying store subscription
    pub subscribed_topics: usize,
    /// Topics subscribed by name
    pub explicit_topics: usize,
    /// Registered regex patterns
    pub patterns: usize,
    /// Topics this client is the publisher of
    pub published_topics: usize,
}

/// Broker-wide statistics
#[derive(Debug, Clone, Default)]
pub struct BrokerStats {
    pub clients: Vec<ClientStats>,
    pub router: RouterStatsSnapshot,
}

impl BrokerStats {
    /// Number of clients currently in `state`
    pub fn count_in_state(&self, state: ClientState) -> usize {
        self.clients.iter().filter(|c| c.state == state).count()
    }
}
