//! Broker statistics

pub mod metrics;

pub use metrics::{BrokerStats, ClientStats, RouterStats, RouterStatsSnapshot};
