//! Client sessions
//!
//! Everything that belongs to a single connected client: its identity, the
//! liveness state machine and monitor, and its topic subscriptions.

pub mod client;
pub mod config;
pub mod error;
pub mod id;
pub mod state;
pub mod subscription;

pub use client::{Client, DisconnectHook};
pub use config::LivenessConfig;
pub use error::SubscriptionError;
pub use id::ClientId;
pub use state::ClientState;
pub use subscription::{PatternId, SubscriptionDescriptor, SubscriptionEngine};
