//! Broker facade

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::config::BrokerConfig;
use crate::error::{Error, Result};
use crate::registry::{ClientRegistry, ClientSpec, RegistryError};
use crate::session::{Client, ClientId, PatternId};
use crate::stats::BrokerStats;
use crate::store::{Record, TopicStore};
use crate::transport::TransportRouter;

/// Client-session and subscription-routing core of a master node
pub struct Broker {
    config: BrokerConfig,
    store: Arc<dyn TopicStore>,
    router: Arc<TransportRouter>,
    registry: ClientRegistry,
    /// Serializes the publisher check-and-claim
    claims: Mutex<()>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Broker {
    /// Create a broker over the given topic store
    ///
    /// Transports are added afterwards through [`Broker::router`].
    pub fn new(config: BrokerConfig, store: Arc<dyn TopicStore>) -> Result<Self> {
        config.validate()?;

        let router = Arc::new(TransportRouter::new(config.probe_expiry));
        let registry = ClientRegistry::new(
            config.liveness.clone(),
            Arc::clone(&store),
            Arc::clone(&router),
        )
        .stale_client_policy(config.reregistration);

        Ok(Self {
            config,
            store,
            router,
            registry,
            claims: Mutex::new(()),
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn router(&self) -> &Arc<TransportRouter> {
        &self.router
    }

    pub fn store(&self) -> &Arc<dyn TopicStore> {
        &self.store
    }

    fn client(&self, id: &ClientId) -> Result<Arc<Client>> {
        self.registry
            .get_client(id)
            .ok_or_else(|| RegistryError::UnknownClient(id.clone()).into())
    }

    /// Register a client (see [`ClientRegistry::process_client_registration`])
    pub fn register(&self, spec: &ClientSpec) -> Result<Arc<Client>> {
        Ok(self.registry.process_client_registration(spec)?)
    }

    /// Deactivate and remove a client
    pub fn deregister(&self, id: &ClientId) -> Result<()> {
        self.registry.remove_client(id)?;
        Ok(())
    }

    /// Subscribe a client to a topic by name
    ///
    /// Returns `false` if it was already subscribed by name.
    pub fn subscribe_topic(&self, id: &ClientId, topic: &str) -> Result<bool> {
        Ok(self.client(id)?.subscriptions().subscribe_topic(topic))
    }

    pub fn unsubscribe_topic(&self, id: &ClientId, topic: &str) -> Result<()> {
        self.client(id)?.subscriptions().unsubscribe_topic(topic)?;
        Ok(())
    }

    pub fn subscribe_regex(&self, id: &ClientId, pattern: &str) -> Result<PatternId> {
        Ok(self.client(id)?.subscriptions().subscribe_regex(pattern)?)
    }

    pub fn unsubscribe_regex(&self, id: &ClientId, pattern: PatternId) -> Result<()> {
        self.client(id)?.subscriptions().unsubscribe_regex(pattern)?;
        Ok(())
    }

    /// Inbound publication from a client
    ///
    /// The first live client to publish a topic owns it until it is
    /// deactivated; publications from any other client are rejected.
    pub fn publish(&self, id: &ClientId, record: Record) -> Result<()> {
        let client = self.client(id)?;
        client.update_last_sign_of_life();

        {
            let _claims = self.claims.lock();
            if let Some(owner) = self.registry.publisher_of(&record.topic) {
                if &owner != id {
                    tracing::warn!(
                        client_id = %id,
                        owner = %owner,
                        topic = %record.topic,
                        "Publication rejected: topic owned by another client"
                    );
                    return Err(Error::TopicClaimed {
                        topic: record.topic,
                        owner,
                    });
                }
            }
            if client.add_published_topic(&record.topic) {
                tracing::debug!(client_id = %id, topic = %record.topic, "Topic claimed");
            }
        }

        self.store.publish(record);
        Ok(())
    }

    /// Send one record to one client outside of any subscription
    pub fn send(&self, id: &ClientId, record: &Record) -> Result<()> {
        let payload = record.encode()?;
        self.router.send(id, payload)?;
        Ok(())
    }

    /// Out-of-band pong from a transport
    ///
    /// Returns `false` if no probe was pending for the client.
    pub fn on_pong(&self, id: &ClientId) -> bool {
        self.router.resolve_pong(id)
    }

    /// Snapshot of every client and the routing counters
    pub fn stats(&self) -> BrokerStats {
        let mut clients: Vec<_> = self.registry.clients().iter().map(|c| c.stats()).collect();
        clients.sort_by(|a, b| a.id.cmp(&b.id));

        BrokerStats {
            clients,
            router: self.router.stats(),
        }
    }

    /// Start the expired-probe sweeper, replacing a running one
    pub fn spawn_probe_sweeper(&self) {
        let handle = self.router.spawn_sweeper(self.config.probe_sweep_interval);
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
        tracing::debug!(interval = ?self.config.probe_sweep_interval, "Probe sweeper started");
    }

    /// Stop the sweeper and deactivate every client
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.registry.clear();
        tracing::info!("Broker shut down");
    }

    /// Run the sweeper until `shutdown` resolves, then shut down
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.spawn_probe_sweeper();
        shutdown.await;
        tracing::info!("Shutdown signal received");
        self.shutdown();
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}
