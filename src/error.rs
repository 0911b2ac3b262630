//! Crate-level error type
//!
//! Each module owns a narrow error enum; this type unifies them for callers
//! (typically an RPC layer) that want a single `Result`.

use std::time::Duration;

use crate::registry::RegistryError;
use crate::session::{ClientId, SubscriptionError};
use crate::transport::TransportError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Invalid liveness or broker configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Thresholds must be strictly increasing: ping < standby < inactive < disconnect
    #[error(
        "liveness thresholds out of order: ping {ping:?}, standby {standby:?}, inactive {inactive:?}, disconnect {disconnect:?}"
    )]
    ThresholdOrder {
        ping: Duration,
        standby: Duration,
        inactive: Duration,
        disconnect: Duration,
    },

    /// The liveness tick period must be non-zero
    #[error("liveness tick interval must be greater than zero")]
    ZeroTick,
}

/// Top-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Another live client is already the publisher of this topic
    #[error("topic {topic} is already published by client {owner}")]
    TopicClaimed { topic: String, owner: ClientId },

    /// Record could not be encoded for the wire
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}
