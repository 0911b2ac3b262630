//! Client session
//!
//! A [`Client`] is one remote process known to the broker. It owns its
//! liveness monitor (a periodic task that reclassifies the client from the
//! time since its last sign of life and probes it through the router), its
//! subscription engine, and the set of topics it publishes.

use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::config::LivenessConfig;
use super::id::ClientId;
use super::state::ClientState;
use super::subscription::SubscriptionEngine;
use crate::stats::ClientStats;
use crate::store::{DeliveryCallback, Record, TopicStore};
use crate::transport::{ProbeTicket, TransportRouter};

/// Called once when the liveness monitor drives a client to DISCONNECTED
pub type DisconnectHook = Box<dyn FnOnce(&Arc<Client>) + Send>;

struct Liveness {
    state: ClientState,
    last_sign_of_life: Option<Instant>,
    monitor: Option<JoinHandle<()>>,
    /// Last probe this session issued
    probe: Option<ProbeTicket>,
}

/// A registered remote process
pub struct Client {
    id: ClientId,
    name: String,
    registered_at: SystemTime,
    config: LivenessConfig,
    store: Arc<dyn TopicStore>,
    router: Arc<TransportRouter>,
    subscriptions: SubscriptionEngine,
    liveness: Mutex<Liveness>,
    published_topics: Mutex<HashSet<String>>,
    deactivated: AtomicBool,
    superseded: AtomicBool,
    on_disconnected: Mutex<Option<DisconnectHook>>,
}

impl Client {
    /// Create an ACTIVE client with empty subscription tables
    ///
    /// The liveness monitor is not started; see [`Client::start_life_monitoring`].
    pub fn new(
        id: ClientId,
        name: impl Into<String>,
        config: LivenessConfig,
        store: Arc<dyn TopicStore>,
        router: Arc<TransportRouter>,
    ) -> Arc<Self> {
        let delivery: DeliveryCallback = {
            let router = Arc::clone(&router);
            let id = id.clone();
            Arc::new(move |record: &Record| deliver(&router, &id, record))
        };

        Arc::new(Self {
            subscriptions: SubscriptionEngine::new(id.clone(), Arc::clone(&store), delivery),
            id,
            name: name.into(),
            registered_at: SystemTime::now(),
            config,
            store,
            router,
            liveness: Mutex::new(Liveness {
                state: ClientState::Active,
                last_sign_of_life: None,
                monitor: None,
                probe: None,
            }),
            published_topics: Mutex::new(HashSet::new()),
            deactivated: AtomicBool::new(false),
            superseded: AtomicBool::new(false),
            on_disconnected: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registered_at(&self) -> SystemTime {
        self.registered_at
    }

    /// State as of the last liveness evaluation
    pub fn state(&self) -> ClientState {
        self.liveness.lock().state
    }

    pub fn last_sign_of_life(&self) -> Option<Instant> {
        self.liveness.lock().last_sign_of_life
    }

    /// Subscription engine for this client
    pub fn subscriptions(&self) -> &SubscriptionEngine {
        &self.subscriptions
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated.load(Ordering::SeqCst)
    }

    /// Whether a newer session took over this client's id
    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::SeqCst)
    }

    /// Mark this session as replaced by a newer one under the same id
    ///
    /// Probes and pongs for the id belong to the newer session from now on,
    /// so this one stops probing and ignores replies. Its monitor keeps
    /// running and decays it to DISCONNECTED.
    pub fn supersede(&self) {
        if !self.superseded.swap(true, Ordering::SeqCst) {
            tracing::info!(client_id = %self.id, name = %self.name, "Client session superseded");
        }
    }

    /// Whether the liveness monitor task is running
    pub fn is_monitoring(&self) -> bool {
        self.liveness
            .lock()
            .monitor
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Record that the client was just heard from
    pub fn update_last_sign_of_life(&self) {
        self.liveness.lock().last_sign_of_life = Some(Instant::now());
    }

    /// Install the hook run when the monitor disconnects this client
    pub fn set_disconnect_hook(&self, hook: DisconnectHook) {
        *self.on_disconnected.lock() = Some(hook);
    }

    /// Claim a topic as published by this client. Returns `false` if already claimed.
    pub fn add_published_topic(&self, topic: &str) -> bool {
        self.published_topics.lock().insert(topic.to_string())
    }

    pub fn is_publisher_of(&self, topic: &str) -> bool {
        self.published_topics.lock().contains(topic)
    }

    /// Topics this client publishes, sorted
    pub fn published_topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.published_topics.lock().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Stamp a sign of life, probe once, and start the periodic monitor
    ///
    /// Must be called from within a tokio runtime. Restarting replaces the
    /// previous monitor task.
    pub fn start_life_monitoring(self: &Arc<Self>) {
        if self.is_deactivated() {
            tracing::warn!(client_id = %self.id, "Not monitoring a deactivated client");
            return;
        }

        self.update_last_sign_of_life();
        self.probe();

        let client = Arc::downgrade(self);
        let period = self.config.tick_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(client) = client.upgrade() else {
                    break;
                };

                // A panicking tick is logged and the next tick still runs
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    client.evaluate_liveness(Instant::now())
                }));
                match outcome {
                    Ok(state) if state.is_terminal() => break,
                    Ok(_) => {}
                    Err(_) => {
                        tracing::error!(client_id = %client.id, "Liveness tick panicked");
                    }
                }
            }
        });

        let previous = self.liveness.lock().monitor.replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }

        tracing::debug!(client_id = %self.id, tick = ?period, "Liveness monitoring started");
    }

    /// Cancel the monitor task. Safe to call when it is not running.
    pub fn stop_life_monitoring(&self) {
        let handle = self.liveness.lock().monitor.take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!(client_id = %self.id, "Liveness monitoring stopped");
        }
    }

    /// One step of the liveness state machine
    ///
    /// Reclassifies the client from the time elapsed since its last sign of
    /// life, deactivates it on DISCONNECTED, and probes it once the ping
    /// threshold has passed.
    pub fn evaluate_liveness(self: &Arc<Self>, now: Instant) -> ClientState {
        if self.is_deactivated() {
            return ClientState::Disconnected;
        }

        let (previous, state, elapsed) = {
            let mut liveness = self.liveness.lock();
            let last = liveness.last_sign_of_life.unwrap_or(now);
            let elapsed = now.saturating_duration_since(last);
            let state = ClientState::classify(elapsed, &self.config);
            let previous = std::mem::replace(&mut liveness.state, state);
            (previous, state, elapsed)
        };

        if previous != state {
            tracing::info!(
                client_id = %self.id,
                name = %self.name,
                from = %previous,
                to = %state,
                elapsed = ?elapsed,
                "Client state changed"
            );
        }

        if state.is_terminal() {
            self.deactivate();
            let hook = self.on_disconnected.lock().take();
            if let Some(hook) = hook {
                hook(self);
            }
            return state;
        }

        if ClientState::needs_probe(elapsed, &self.config) {
            self.probe();
        }
        state
    }

    fn probe(self: &Arc<Self>) {
        if self.is_superseded() {
            return;
        }

        let client = Arc::downgrade(self);
        let result = self.router.ping(
            &self.id,
            Box::new(move || {
                if let Some(client) = client.upgrade() {
                    client.on_probe_reply();
                }
            }),
        );

        match result {
            Ok(ticket) => self.liveness.lock().probe = Some(ticket),
            Err(e) => {
                tracing::debug!(client_id = %self.id, error = %e, "Liveness probe not sent");
            }
        }
    }

    fn on_probe_reply(&self) {
        if self.is_deactivated() || self.is_superseded() {
            tracing::trace!(client_id = %self.id, "Ignoring probe reply for retired session");
            return;
        }
        self.update_last_sign_of_life();
    }

    /// Stop monitoring, release every subscription, and remove published
    /// topics from the store
    ///
    /// Idempotent: returns `false` if the client was already deactivated.
    pub fn deactivate(&self) -> bool {
        if self.deactivated.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.stop_life_monitoring();
        self.liveness.lock().state = ClientState::Disconnected;
        self.subscriptions.unsubscribe_all();

        let published: Vec<String> = self.published_topics.lock().drain().collect();
        for topic in &published {
            self.store.remove(topic);
        }
        let probe = self.liveness.lock().probe.take();
        if let Some(ticket) = probe {
            self.router.cancel_probe(&self.id, ticket);
        }

        tracing::info!(
            client_id = %self.id,
            name = %self.name,
            published_topics = published.len(),
            "Client deactivated"
        );
        true
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> ClientStats {
        let (state, last) = {
            let liveness = self.liveness.lock();
            (liveness.state, liveness.last_sign_of_life)
        };

        ClientStats {
            id: self.id.clone(),
            name: self.name.clone(),
            state,
            registered_at: self.registered_at,
            since_last_sign_of_life: last.map(|t| t.elapsed()),
            subscribed_topics: self.subscriptions.subscribed_topics().len(),
            explicit_topics: self.subscriptions.explicit_count(),
            patterns: self.subscriptions.patterns().len(),
            published_topics: self.published_topics.lock().len(),
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("deactivated", &self.is_deactivated())
            .finish_non_exhaustive()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(handle) = self.liveness.get_mut().monitor.take() {
            handle.abort();
        }
    }
}

/// Encode a record and hand it to whichever transport holds the client
fn deliver(router: &TransportRouter, id: &ClientId, record: &Record) {
    match record.encode() {
        Ok(payload) => {
            if router.send(id, payload).is_ok() {
                tracing::trace!(client_id = %id, topic = %record.topic, "Record delivered");
            }
        }
        Err(e) => {
            tracing::warn!(
                client_id = %id,
                topic = %record.topic,
                error = %e,
                "Failed to encode record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use bytes::Bytes;

    use super::*;
    use crate::store::{MemoryTopicStore, RecordValue};
    use crate::test_util::init_tracing;
    use crate::transport::{ChannelTransport, Frame, Transport, TransportError};

    struct Harness {
        store: Arc<MemoryTopicStore>,
        router: Arc<TransportRouter>,
        client: Arc<Client>,
        rx: mpsc::Receiver<Frame>,
    }

    fn config() -> LivenessConfig {
        LivenessConfig::default()
            .ping_after(Duration::from_millis(400))
            .standby_after(Duration::from_millis(1000))
            .inactive_after(Duration::from_millis(5000))
            .disconnect_after(Duration::from_millis(10000))
            .tick_interval(Duration::from_millis(500))
    }

    /// Holds every client and panics on its second ping
    #[derive(Default)]
    struct PanickingTransport {
        pings: AtomicUsize,
    }

    impl Transport for PanickingTransport {
        fn name(&self) -> &str {
            "panicking"
        }

        fn has_client(&self, _id: &ClientId) -> bool {
            true
        }

        fn send(&self, _id: &ClientId, _payload: Bytes) -> Result<(), TransportError> {
            Ok(())
        }

        fn ping(&self, _id: &ClientId) -> Result<(), TransportError> {
            if self.pings.fetch_add(1, Ordering::SeqCst) == 1 {
                panic!("ping failed");
            }
            Ok(())
        }
    }

    fn harness() -> Harness {
        init_tracing();
        let store = Arc::new(MemoryTopicStore::new());
        let router = Arc::new(TransportRouter::new(Duration::from_secs(30)));
        let transport = Arc::new(ChannelTransport::new("ipc"));
        router.add_transport(transport.clone());

        let id = ClientId::from("client-1");
        let rx = transport.attach(id.clone(), 256);
        let client = Client::new(id, "sensor", config(), store.clone(), Arc::clone(&router));

        Harness {
            store,
            router,
            client,
            rx,
        }
    }

    fn drain_pings(rx: &mut mpsc::Receiver<Frame>) -> usize {
        let mut pings = 0;
        while let Ok(frame) = rx.try_recv() {
            if frame == Frame::Ping {
                pings += 1;
            }
        }
        pings
    }

    #[tokio::test]
    async fn test_six_seconds_without_reply_is_inactive() {
        let h = harness();
        h.client.update_last_sign_of_life();
        let last = h.client.last_sign_of_life().unwrap();

        let state = h.client.evaluate_liveness(last + Duration::from_millis(6000));

        assert_eq!(state, ClientState::Inactive);
        assert_eq!(h.client.state(), ClientState::Inactive);
        assert!(!h.client.is_deactivated());
    }

    #[tokio::test]
    async fn test_evaluate_probes_after_ping_threshold() {
        let mut h = harness();
        h.client.update_last_sign_of_life();
        let last = h.client.last_sign_of_life().unwrap();

        h.client.evaluate_liveness(last + Duration::from_millis(300));
        assert_eq!(drain_pings(&mut h.rx), 0);

        h.client.evaluate_liveness(last + Duration::from_millis(450));
        assert_eq!(drain_pings(&mut h.rx), 1);
        assert_eq!(h.router.pending_probes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_decays_without_replies() {
        let mut h = harness();
        let disconnected = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disconnected);
        h.client.set_disconnect_hook(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        h.client.start_life_monitoring();
        assert!(h.client.is_monitoring());
        assert_eq!(h.rx.recv().await, Some(Frame::Ping));

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(h.client.state(), ClientState::Active);

        tokio::time::sleep(Duration::from_millis(2550)).await;
        assert_eq!(h.client.state(), ClientState::Standby);

        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(h.client.state(), ClientState::Inactive);

        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(h.client.state(), ClientState::Disconnected);
        assert!(h.client.is_deactivated());
        assert!(!h.client.is_monitoring());
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(h.router.pending_probes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_does_not_stop_monitoring() {
        init_tracing();
        let store = Arc::new(MemoryTopicStore::new());
        let router = Arc::new(TransportRouter::new(Duration::from_secs(30)));
        let transport = Arc::new(PanickingTransport::default());
        router.add_transport(Arc::clone(&transport) as Arc<dyn Transport>);
        let client = Client::new(ClientId::from("flaky"), "sensor", config(), store, router);

        client.start_life_monitoring();

        // The tick at 500ms panics inside its probe
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(transport.pings.load(Ordering::SeqCst), 2);
        assert!(client.is_monitoring());

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(client.state(), ClientState::Inactive);
        assert!(client.is_monitoring());
        assert!(transport.pings.load(Ordering::SeqCst) > 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_reply_restores_active() {
        let h = harness();
        h.client.start_life_monitoring();

        tokio::time::sleep(Duration::from_millis(2250)).await;
        assert_eq!(h.client.state(), ClientState::Standby);

        assert!(h.router.resolve_pong(h.client.id()));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.client.state(), ClientState::Active);
    }

    #[tokio::test]
    async fn test_late_reply_after_deactivation_is_ignored() {
        let h = harness();
        h.client.update_last_sign_of_life();
        let before = h.client.last_sign_of_life();

        h.client.deactivate();
        h.client.on_probe_reply();

        assert_eq!(h.client.last_sign_of_life(), before);
        assert_eq!(h.client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_stop_monitoring_is_safe_when_idle() {
        let h = harness();

        h.client.stop_life_monitoring();
        h.client.start_life_monitoring();
        h.client.stop_life_monitoring();
        h.client.stop_life_monitoring();

        assert!(!h.client.is_monitoring());
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent_and_cleans_up() {
        let h = harness();
        h.store
            .publish(Record::new("/sensor/temp", RecordValue::Double(21.5)));
        h.client.add_published_topic("/sensor/temp");
        h.client.subscriptions().subscribe_topic("/cmd");
        h.client.subscriptions().subscribe_regex("^/room/").unwrap();
        h.client.start_life_monitoring();

        assert!(h.client.deactivate());
        assert!(!h.client.deactivate());

        assert!(!h.store.has_data("/sensor/temp"));
        assert!(h.client.published_topics().is_empty());
        assert_eq!(h.store.subscription_count("/cmd"), 0);
        assert_eq!(h.store.listener_count(), 0);
        assert!(!h.client.is_monitoring());
        assert_eq!(h.router.pending_probes(), 0);
    }

    #[tokio::test]
    async fn test_deactivated_client_does_not_restart_monitoring() {
        let h = harness();
        h.client.deactivate();

        h.client.start_life_monitoring();

        assert!(!h.client.is_monitoring());
    }

    #[tokio::test]
    async fn test_delivery_is_encoded_and_routed() {
        let mut h = harness();
        h.store.publish(Record::with_timestamp(
            "/room/a",
            5,
            RecordValue::String("hi".into()),
        ));

        h.client.subscriptions().subscribe_topic("/room/a");

        let Some(Frame::Data(bytes)) = h.rx.recv().await else {
            panic!("expected data frame");
        };
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["topic"], "/room/a");
        assert_eq!(json["timestamp"], 5);
        assert_eq!(json["string"], "hi");
    }

    #[tokio::test]
    async fn test_debug_shows_identity() {
        let h = harness();

        let debug = format!("{:?}", h.client);

        assert!(debug.contains("client-1"));
        assert!(debug.contains("sensor"));
        assert!(debug.contains("Active"));
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let h = harness();
        h.client.update_last_sign_of_life();
        h.client.subscriptions().subscribe_topic("/a");
        h.client.add_published_topic("/out");

        let stats = h.client.stats();
        assert_eq!(stats.name, "sensor");
        assert_eq!(stats.state, ClientState::Active);
        assert_eq!(stats.explicit_topics, 1);
        assert_eq!(stats.subscribed_topics, 1);
        assert_eq!(stats.published_topics, 1);
        assert!(stats.since_last_sign_of_life.is_some());
    }
}
