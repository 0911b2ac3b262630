//! Client registry implementation
//!
//! The map of every registered client and the registration protocol. The
//! registry is an ordinary value: construct one and hand it to whatever
//! needs it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::RegistryError;
use super::request::ClientSpec;
use crate::session::{Client, ClientId, ClientState, LivenessConfig};
use crate::store::TopicStore;
use crate::transport::TransportRouter;

type ClientMap = HashMap<ClientId, Arc<Client>>;

/// What happens to a stale client replaced by a re-registration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StaleClientPolicy {
    /// Deactivate the stale client (stop its monitor, release its
    /// subscriptions and published topics) before replacing it
    #[default]
    Deactivate,
    /// Only drop the stale client from the map. It stops probing, and its
    /// monitor keeps running until it disconnects on its own; its
    /// subscriptions stay live until then.
    Detach,
}

/// Registry of all known clients
pub struct ClientRegistry {
    clients: Arc<Mutex<ClientMap>>,
    store: Arc<dyn TopicStore>,
    router: Arc<TransportRouter>,
    liveness: LivenessConfig,
    stale_policy: StaleClientPolicy,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new(
        liveness: LivenessConfig,
        store: Arc<dyn TopicStore>,
        router: Arc<TransportRouter>,
    ) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            store,
            router,
            liveness,
            stale_policy: StaleClientPolicy::default(),
        }
    }

    /// Set how stale clients are treated on re-registration
    pub fn stale_client_policy(mut self, policy: StaleClientPolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn has_client(&self, id: &ClientId) -> bool {
        self.clients.lock().contains_key(id)
    }

    /// Alias of [`ClientRegistry::has_client`] used on the inbound path
    pub fn verify_client(&self, id: &ClientId) -> bool {
        self.has_client(id)
    }

    pub fn get_client(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.clients.lock().get(id).cloned()
    }

    /// Insert under the client's id without any uniqueness check
    ///
    /// Returns the entry previously stored under that id.
    pub fn add_client(&self, client: Arc<Client>) -> Option<Arc<Client>> {
        self.clients.lock().insert(client.id().clone(), client)
    }

    /// Deactivate a client and remove it
    pub fn remove_client(&self, id: &ClientId) -> Result<Arc<Client>, RegistryError> {
        let client = self
            .clients
            .lock()
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownClient(id.clone()))?;

        client.deactivate();
        tracing::info!(client_id = %id, name = %client.name(), "Client removed");
        Ok(client)
    }

    /// Add a client and start its liveness monitor
    ///
    /// When the monitor later disconnects the client, it is removed from
    /// this registry unless the entry has since been replaced.
    pub fn register_client(&self, client: &Arc<Client>) {
        self.add_client(Arc::clone(client));

        let clients = Arc::downgrade(&self.clients);
        client.set_disconnect_hook(Box::new(move |client| {
            let Some(clients) = clients.upgrade() else {
                return;
            };
            let mut clients = clients.lock();
            let current = clients
                .get(client.id())
                .is_some_and(|entry| Arc::ptr_eq(entry, client));
            if current {
                clients.remove(client.id());
                tracing::info!(
                    client_id = %client.id(),
                    name = %client.name(),
                    "Disconnected client removed"
                );
            }
        }));

        client.start_life_monitoring();
    }

    /// Registration protocol
    ///
    /// - no id: a new client with a generated id
    /// - id of an ACTIVE client: rejected
    /// - id of a non-ACTIVE client with the same name: the stale entry is
    ///   replaced according to the [`StaleClientPolicy`]
    /// - id of a client with another name: rejected
    /// - unknown id: a new client under that id
    pub fn process_client_registration(
        &self,
        spec: &ClientSpec,
    ) -> Result<Arc<Client>, RegistryError> {
        if let Some(existing) = spec.id.as_ref().and_then(|id| self.get_client(id)) {
            if existing.state() == ClientState::Active {
                return Err(RegistryError::AlreadyRegisteredActive(existing.id().clone()));
            }
            if existing.name() != spec.name {
                return Err(RegistryError::NameMismatch {
                    id: existing.id().clone(),
                    registered: existing.name().to_string(),
                    requested: spec.name.clone(),
                });
            }
            self.replace_stale(&existing);
        }

        let id = spec.id.clone().unwrap_or_else(ClientId::generate);
        let client = Client::new(
            id,
            spec.name.clone(),
            self.liveness.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.router),
        );
        self.register_client(&client);
        client.update_last_sign_of_life();

        tracing::info!(client_id = %client.id(), name = %client.name(), "Client registered");
        Ok(client)
    }

    fn replace_stale(&self, stale: &Arc<Client>) {
        {
            let mut clients = self.clients.lock();
            if clients
                .get(stale.id())
                .is_some_and(|entry| Arc::ptr_eq(entry, stale))
            {
                clients.remove(stale.id());
            }
        }

        tracing::info!(
            client_id = %stale.id(),
            state = %stale.state(),
            policy = ?self.stale_policy,
            "Replacing stale client"
        );

        match self.stale_policy {
            StaleClientPolicy::Deactivate => {
                stale.deactivate();
            }
            StaleClientPolicy::Detach => {
                stale.supersede();
                tracing::warn!(
                    client_id = %stale.id(),
                    "Stale client detached without cleanup"
                );
            }
        }
    }

    /// Client currently claiming `topic` as its publication
    pub fn publisher_of(&self, topic: &str) -> Option<ClientId> {
        self.clients
            .lock()
            .values()
            .find(|c| c.is_publisher_of(topic))
            .map(|c| c.id().clone())
    }

    /// Snapshot of all registered clients
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.clients.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Deactivate and remove every client
    pub fn clear(&self) {
        let clients: Vec<_> = self.clients.lock().drain().map(|(_, c)| c).collect();
        for client in &clients {
            client.deactivate();
        }
        if !clients.is_empty() {
            tracing::info!(count = clients.len(), "All clients removed");
        }
    }
}
