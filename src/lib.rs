//! Client-session and topic-subscription routing core for a pub/sub master node
//!
//! Tracks which remote clients are alive, which topics each one wants, and
//! routes topic updates from the topic store to the right client connection.
//!
//! # Architecture
//!
//! ```text
//!   RPC layer / inbound path
//!            │ register, subscribe, publish, pong
//!            ▼
//!   ┌──────────────────┐
//!   │      Broker      │
//!   └────────┬─────────┘
//!            │
//!   ┌────────▼─────────┐        ┌────────────────────┐
//!   │  ClientRegistry  │        │     TopicStore     │
//!   │  id -> Client    │        │  topic -> Record   │
//!   └────────┬─────────┘        └──────┬──────▲──────┘
//!            │                  deliver│      │subscribe,
//!   ┌────────▼─────────┐               │      │new-topic listener
//!   │      Client      │◄──────────────┘      │
//!   │ liveness monitor │                      │
//!   │ SubscriptionEngine ─────────────────────┘
//!   └────────┬─────────┘
//!            │ send, ping
//!   ┌────────▼─────────┐
//!   │ TransportRouter  │──► Transport (first that holds the client)
//!   └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use topic_broker::registry::ClientSpec;
//! use topic_broker::server::{Broker, BrokerConfig};
//! use topic_broker::store::{MemoryTopicStore, Record, RecordValue};
//! use topic_broker::transport::{ChannelTransport, Transport};
//!
//! #[tokio::main]
//! async fn main() -> topic_broker::Result<()> {
//!     let broker = Broker::new(BrokerConfig::default(), Arc::new(MemoryTopicStore::new()))?;
//!     let transport = Arc::new(ChannelTransport::new("ipc"));
//!     broker.router().add_transport(transport.clone() as Arc<dyn Transport>);
//!
//!     let client = broker.register(&ClientSpec::new("camera"))?;
//!     let mut frames = transport.attach(client.id().clone(), 64);
//!
//!     broker.subscribe_regex(client.id(), "^/camera/")?;
//!     broker.publish(client.id(), Record::new("/camera/fps", RecordValue::Double(30.0)))?;
//!
//!     while let Some(frame) = frames.recv().await {
//!         println!("{frame:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;
pub mod transport;


pub use error::{ConfigError, Error, Result};
pub use registry::{ClientRegistry, ClientSpec, RegistryError, StaleClientPolicy};
pub use server::{Broker, BrokerConfig};
pub use session::{Client, ClientId, ClientState, LivenessConfig, PatternId};
pub use store::{MemoryTopicStore, Record, RecordValue, TopicStore};
pub use transport::{ChannelTransport, Transport, TransportRouter};
