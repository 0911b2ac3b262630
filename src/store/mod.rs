//! Topic store interface
//!
//! The topic store holds the current value per topic and fans published
//! records out to subscribers. The broker core only talks to it through the
//! [`TopicStore`] trait; [`MemoryTopicStore`] is the in-process implementation.
//!
//! # Callback contract
//!
//! Implementations must invoke delivery callbacks and new-topic listeners
//! without holding any internal lock, so a callback may re-enter the store
//! (for example a new-topic listener that subscribes to the topic it was
//! told about).

pub mod memory;
pub mod record;

use std::fmt;
use std::sync::Arc;

pub use memory::MemoryTopicStore;
pub use record::{Record, RecordValue, Vector3};

/// Invoked with every record published to a subscribed topic
pub type DeliveryCallback = Arc<dyn Fn(&Record) + Send + Sync>;

/// Invoked with the name of every newly created topic
pub type TopicListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle for a topic (or all-topics) subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(pub u64);

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Handle for a new-topic listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerToken(pub u64);

/// Key/value topic store with publish/subscribe primitives
pub trait TopicStore: Send + Sync {
    /// Store `record` as the current value of its topic and notify subscribers
    fn publish(&self, record: Record);

    /// Current value of a topic
    fn pull(&self, topic: &str) -> Option<Record>;

    /// Whether a topic currently holds data
    fn has_data(&self, topic: &str) -> bool {
        self.pull(topic).is_some()
    }

    /// Remove a topic and its value
    fn remove(&self, topic: &str) -> Option<Record>;

    /// Subscribe to one topic
    fn subscribe(&self, topic: &str, callback: DeliveryCallback) -> SubscriptionToken;

    /// Subscribe to one topic and return its value at the moment the
    /// subscription became live
    ///
    /// A record published afterwards reaches `callback` and is never the
    /// returned snapshot. The default implementation is not atomic.
    fn subscribe_with_current(
        &self,
        topic: &str,
        callback: DeliveryCallback,
    ) -> (SubscriptionToken, Option<Record>) {
        let token = self.subscribe(topic, callback);
        (token, self.pull(topic))
    }

    /// Cancel a subscription. Returns `false` if the token was unknown.
    fn unsubscribe(&self, token: SubscriptionToken) -> bool;

    /// Subscribe to every topic
    fn subscribe_all(&self, callback: DeliveryCallback) -> SubscriptionToken;

    /// Snapshot of every topic that currently holds data
    fn topics_with_data(&self) -> Vec<Record>;

    /// Register a listener for topics created from now on
    fn on_new_topic(&self, listener: TopicListener) -> ListenerToken;

    /// Remove a new-topic listener. Returns `false` if the token was unknown.
    fn remove_new_topic_listener(&self, token: ListenerToken) -> bool;
}
