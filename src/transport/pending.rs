//! Pending liveness probes
//!
//! One outstanding probe per client id. Each entry carries a deadline so that
//! probes whose pong never arrives are reclaimed instead of accumulating, and
//! a ticket so that only the session that issued it can cancel it.

use std::collections::HashMap;
use std::fmt;

use tokio::time::Instant;

use crate::session::ClientId;

/// Invoked once when the client's pong arrives
pub type ProbeCallback = Box<dyn FnOnce() + Send>;

/// Identifies one issued probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeTicket(u64);

impl fmt::Display for ProbeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "probe#{}", self.0)
    }
}

struct PendingProbe {
    ticket: ProbeTicket,
    callback: ProbeCallback,
    deadline: Instant,
}

#[derive(Default)]
pub(crate) struct PendingProbes {
    probes: HashMap<ClientId, PendingProbe>,
    next_ticket: u64,
}

impl PendingProbes {
    /// Store a probe, replacing any older one for the same client
    pub(crate) fn insert(
        &mut self,
        id: ClientId,
        callback: ProbeCallback,
        deadline: Instant,
    ) -> ProbeTicket {
        self.next_ticket += 1;
        let ticket = ProbeTicket(self.next_ticket);
        self.probes.insert(
            id,
            PendingProbe {
                ticket,
                callback,
                deadline,
            },
        );
        ticket
    }

    /// Remove and return the client's probe callback
    pub(crate) fn take(&mut self, id: &ClientId) -> Option<ProbeCallback> {
        self.probes.remove(id).map(|p| p.callback)
    }

    /// Drop the client's probe only if it is still the one behind `ticket`
    pub(crate) fn cancel(&mut self, id: &ClientId, ticket: ProbeTicket) -> bool {
        if self.probes.get(id).is_some_and(|p| p.ticket == ticket) {
            self.probes.remove(id);
            true
        } else {
            false
        }
    }

    /// Drop every probe whose deadline is at or before `now`
    pub(crate) fn reclaim_expired(&mut self, now: Instant) -> usize {
        let before = self.probes.len();
        self.probes.retain(|_, probe| probe.deadline > now);
        before - self.probes.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.probes.len()
    }
}
