//! Broker service layer
//!
//! [`Broker`] ties the client registry, the topic store and the transport
//! router together and is the single entry point for the RPC layer and the
//! inbound-message path.

pub mod broker;
pub mod config;

pub use broker::Broker;
pub use config::BrokerConfig;
