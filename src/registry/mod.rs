//! Client registry
//!
//! Entry point used by the service layer and the inbound-message path to
//! register, look up, and remove clients.
//!
//! # Architecture
//!
//! ```text
//!                      ClientRegistry
//!               ┌──────────────────────────┐
//!               │ clients: HashMap<Id,     │
//!               │   Arc<Client> {          │
//!               │     liveness monitor,    │
//!               │     subscriptions,       │
//!               │     published topics     │
//!               │   }                      │
//!               │ >                        │
//!               └────────────┬─────────────┘
//!                            │ disconnect hook
//!        ┌───────────────────┼────────────────────┐
//!        ▼                   ▼                    ▼
//!   TopicStore          TransportRouter      monitor task
//!   (subscribe,         (send, ping)         (tick -> state,
//!    remove)                                  probe, deactivate)
//! ```

pub mod clients;
pub mod error;
pub mod request;

pub use clients::{ClientRegistry, StaleClientPolicy};
pub use error::RegistryError;
pub use request::ClientSpec;
