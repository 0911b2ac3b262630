//! In-memory topic store
//!
//! Single map of topic -> current record, plus subscription and new-topic
//! listener tables. Every mutation happens under one short lock; callbacks
//! are collected under the lock and invoked after it is released.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::record::Record;
use super::{DeliveryCallback, ListenerToken, SubscriptionToken, TopicListener, TopicStore};

struct Subscription {
    /// `None` subscribes to every topic
    topic: Option<String>,
    callback: DeliveryCallback,
}

impl Subscription {
    fn matches(&self, topic: &str) -> bool {
        self.topic.as_deref().map_or(true, |t| t == topic)
    }
}

#[derive(Default)]
struct StoreInner {
    topics: HashMap<String, Record>,
    // Ordered by token so delivery follows subscription order
    subscriptions: BTreeMap<SubscriptionToken, Subscription>,
    listeners: BTreeMap<ListenerToken, TopicListener>,
}

/// Topic store kept entirely in process memory
#[derive(Default)]
pub struct MemoryTopicStore {
    inner: Mutex<StoreInner>,
    next_token: AtomicU64,
}

impl MemoryTopicStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of live subscriptions bound to exactly this topic
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.topic.as_deref() == Some(topic))
            .count()
    }

    /// Number of registered new-topic listeners
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Number of topics holding data
    pub fn topic_count(&self) -> usize {
        self.inner.lock().topics.len()
    }
}

impl TopicStore for MemoryTopicStore {
    fn publish(&self, record: Record) {
        let topic = record.topic.clone();

        let new_topic_listeners: Vec<TopicListener> = {
            let mut inner = self.inner.lock();
            let is_new = inner.topics.insert(topic.clone(), record.clone()).is_none();
            if is_new {
                inner.listeners.values().cloned().collect()
            } else {
                Vec::new()
            }
        };

        if !new_topic_listeners.is_empty() {
            tracing::debug!(
                topic = %topic,
                listeners = new_topic_listeners.len(),
                "New topic created"
            );
            // Listeners run before delivery so anything they attach sees this record
            for listener in new_topic_listeners {
                listener(&topic);
            }
        }

        let callbacks: Vec<DeliveryCallback> = self
            .inner
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.matches(&topic))
            .map(|s| s.callback.clone())
            .collect();

        tracing::trace!(topic = %topic, subscribers = callbacks.len(), "Record published");

        for callback in callbacks {
            callback(&record);
        }
    }

    fn pull(&self, topic: &str) -> Option<Record> {
        self.inner.lock().topics.get(topic).cloned()
    }

    fn has_data(&self, topic: &str) -> bool {
        self.inner.lock().topics.contains_key(topic)
    }

    fn remove(&self, topic: &str) -> Option<Record> {
        let removed = self.inner.lock().topics.remove(topic);
        if removed.is_some() {
            tracing::debug!(topic = %topic, "Topic removed");
        }
        removed
    }

    fn subscribe(&self, topic: &str, callback: DeliveryCallback) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token());
        self.inner.lock().subscriptions.insert(
            token,
            Subscription {
                topic: Some(topic.to_string()),
                callback,
            },
        );
        token
    }

    fn subscribe_with_current(
        &self,
        topic: &str,
        callback: DeliveryCallback,
    ) -> (SubscriptionToken, Option<Record>) {
        let token = SubscriptionToken(self.next_token());
        let mut inner = self.inner.lock();
        inner.subscriptions.insert(
            token,
            Subscription {
                topic: Some(topic.to_string()),
                callback,
            },
        );
        (token, inner.topics.get(topic).cloned())
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.inner.lock().subscriptions.remove(&token).is_some()
    }

    fn subscribe_all(&self, callback: DeliveryCallback) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token());
        self.inner.lock().subscriptions.insert(
            token,
            Subscription {
                topic: None,
                callback,
            },
        );
        token
    }

    fn topics_with_data(&self) -> Vec<Record> {
        self.inner.lock().topics.values().cloned().collect()
    }

    fn on_new_topic(&self, listener: TopicListener) -> ListenerToken {
        let token = ListenerToken(self.next_token());
        self.inner.lock().listeners.insert(token, listener);
        token
    }

    fn remove_new_topic_listener(&self, token: ListenerToken) -> bool {
        self.inner.lock().listeners.remove(&token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::RecordValue;

    fn record(topic: &str, value: f64) -> Record {
        Record::with_timestamp(topic, 0, RecordValue::Double(value))
    }

    fn collector() -> (DeliveryCallback, Arc<Mutex<Vec<Record>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: DeliveryCallback = Arc::new(move |r: &Record| sink.lock().push(r.clone()));
        (callback, seen)
    }

    #[test]
    fn test_publish_and_pull() {
        let store = MemoryTopicStore::new();
        assert!(!store.has_data("/a"));

        store.publish(record("/a", 1.0));
        store.publish(record("/a", 2.0));

        assert!(store.has_data("/a"));
        assert_eq!(store.pull("/a").unwrap().value, RecordValue::Double(2.0));
        assert_eq!(store.topic_count(), 1);
    }

    #[test]
    fn test_subscribe_only_receives_own_topic() {
        let store = MemoryTopicStore::new();
        let (callback, seen) = collector();
        let token = store.subscribe("/a", callback);

        store.publish(record("/a", 1.0));
        store.publish(record("/b", 2.0));
        assert_eq!(seen.lock().len(), 1);

        assert!(store.unsubscribe(token));
        assert!(!store.unsubscribe(token));
        store.publish(record("/a", 3.0));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_subscribe_with_current() {
        let store = MemoryTopicStore::new();
        let (callback, seen) = collector();
        store.publish(record("/a", 1.0));

        let (token, current) = store.subscribe_with_current("/a", callback);
        assert_eq!(current.map(|r| r.value), Some(RecordValue::Double(1.0)));
        assert!(seen.lock().is_empty());

        store.publish(record("/a", 2.0));
        assert_eq!(seen.lock().len(), 1);
        assert!(store.unsubscribe(token));
    }

    #[test]
    fn test_subscribe_all() {
        let store = MemoryTopicStore::new();
        let (callback, seen) = collector();
        store.subscribe_all(callback);

        store.publish(record("/a", 1.0));
        store.publish(record("/b", 2.0));

        assert_eq!(seen.lock().len(), 2);
        assert_eq!(store.subscription_count("/a"), 0);
    }

    #[test]
    fn test_new_topic_fires_once() {
        let store = MemoryTopicStore::new();
        let created = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&created);
        let token = store.on_new_topic(Arc::new(move |t: &str| sink.lock().push(t.to_string())));

        store.publish(record("/a", 1.0));
        store.publish(record("/a", 2.0));
        store.publish(record("/b", 1.0));
        assert_eq!(*created.lock(), vec!["/a".to_string(), "/b".to_string()]);

        assert!(store.remove_new_topic_listener(token));
        store.publish(record("/c", 1.0));
        assert_eq!(created.lock().len(), 2);
    }

    #[test]
    fn test_listener_can_subscribe_to_new_topic_reentrantly() {
        let store = Arc::new(MemoryTopicStore::new());
        let (callback, seen) = collector();

        let weak = Arc::downgrade(&store);
        store.on_new_topic(Arc::new(move |topic: &str| {
            if let Some(store) = weak.upgrade() {
                store.subscribe(topic, callback.clone());
            }
        }));

        store.publish(record("/fresh", 1.0));

        // The subscription attached by the listener sees the creating record
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(store.subscription_count("/fresh"), 1);
    }

    #[test]
    fn test_remove_and_snapshot() {
        let store = MemoryTopicStore::new();
        store.publish(record("/a", 1.0));
        store.publish(record("/b", 1.0));

        let mut topics: Vec<String> = store
            .topics_with_data()
            .into_iter()
            .map(|r| r.topic)
            .collect();
        topics.sort();
        assert_eq!(topics, vec!["/a", "/b"]);

        assert!(store.remove("/a").is_some());
        assert!(store.remove("/a").is_none());
        assert!(!store.has_data("/a"));
    }
}
