//! Per-client subscription engine
//!
//! Interest in a topic comes from two independent sources: explicit
//! subscribe-by-name calls and regex patterns matching the topic. Both share
//! one descriptor table, and a descriptor owns exactly one underlying store
//! subscription for as long as either source still references the topic.
//!
//! ```text
//!   topics: "/room/a" -> { token: sub#4, explicit: true,  patterns: {p1} }
//!           "/room/b" -> { token: sub#7, explicit: false, patterns: {p1, p2} }
//!
//!   patterns: p1 -> { "^/room/", listener#5 }
//!             p2 -> { "/b$",     listener#6 }
//! ```
//!
//! Invariant: a descriptor exists for a topic iff `explicit || !patterns.is_empty()`,
//! and a descriptor exists iff its store subscription is live.
//!
//! Store calls made while the table lock is held never invoke callbacks, so
//! the only lock order is table -> store.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use regex::Regex;

use super::error::SubscriptionError;
use super::id::ClientId;
use crate::store::{DeliveryCallback, ListenerToken, SubscriptionToken, TopicListener, TopicStore};

/// Identifier of a regex subscription within one client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternId(u64);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pattern#{}", self.0)
    }
}

/// Why a client holds a store subscription for one topic
#[derive(Debug, Clone)]
pub struct SubscriptionDescriptor {
    token: SubscriptionToken,
    explicit: bool,
    pattern_refs: HashSet<PatternId>,
}

impl SubscriptionDescriptor {
    fn new(token: SubscriptionToken) -> Self {
        Self {
            token,
            explicit: false,
            pattern_refs: HashSet::new(),
        }
    }

    /// Underlying store subscription
    pub fn token(&self) -> SubscriptionToken {
        self.token
    }

    /// Subscribed by name
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Patterns currently matching this topic
    pub fn pattern_refs(&self) -> &HashSet<PatternId> {
        &self.pattern_refs
    }

    fn is_referenced(&self) -> bool {
        self.explicit || !self.pattern_refs.is_empty()
    }
}

struct PatternSubscription {
    regex: Regex,
    listener: ListenerToken,
}

#[derive(Default)]
struct SubscriptionTable {
    topics: HashMap<String, SubscriptionDescriptor>,
    patterns: HashMap<PatternId, PatternSubscription>,
    next_pattern: u64,
}

struct EngineInner {
    client_id: ClientId,
    store: Arc<dyn TopicStore>,
    delivery: DeliveryCallback,
    table: Mutex<SubscriptionTable>,
}

impl EngineInner {
    /// Ensure a descriptor for `topic` and add `pattern` to its references
    fn attach(&self, table: &mut SubscriptionTable, topic: &str, pattern: PatternId) {
        let descriptor = table.topics.entry(topic.to_string()).or_insert_with(|| {
            let token = self.store.subscribe(topic, self.delivery.clone());
            tracing::debug!(
                client_id = %self.client_id,
                topic = %topic,
                token = %token,
                "Topic subscribed by pattern"
            );
            SubscriptionDescriptor::new(token)
        });
        descriptor.pattern_refs.insert(pattern);
    }

    /// New-topic listener path; ignores patterns removed in the meantime
    fn attach_new_topic(&self, topic: &str, pattern: PatternId) {
        let mut table = self.table.lock();
        if table.patterns.contains_key(&pattern) {
            self.attach(&mut table, topic, pattern);
        }
    }
}

/// Reference-counted topic subscriptions for one client
pub struct SubscriptionEngine {
    inner: Arc<EngineInner>,
}

impl SubscriptionEngine {
    /// Create an empty engine; `delivery` receives every record for every
    /// topic this client is subscribed to
    pub fn new(client_id: ClientId, store: Arc<dyn TopicStore>, delivery: DeliveryCallback) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                client_id,
                store,
                delivery,
                table: Mutex::new(SubscriptionTable::default()),
            }),
        }
    }

    /// Subscribe to a topic by name
    ///
    /// Returns `false` (and changes nothing) if already subscribed by name.
    /// If the topic already holds data it is delivered immediately, once.
    /// A topic already matched by a pattern has its current value delivered
    /// again, since the pattern never replays it.
    pub fn subscribe_topic(&self, topic: &str) -> bool {
        let inner = &self.inner;
        let current = {
            let mut table = inner.table.lock();
            match table.topics.get_mut(topic) {
                Some(descriptor) if descriptor.explicit => {
                    tracing::warn!(
                        client_id = %inner.client_id,
                        topic = %topic,
                        "Already subscribed to topic"
                    );
                    return false;
                }
                Some(descriptor) => {
                    descriptor.explicit = true;
                    inner.store.pull(topic)
                }
                None => {
                    // Snapshot taken atomically with the subscription, so a
                    // concurrent publish is delivered once, by the store
                    let (token, current) =
                        inner.store.subscribe_with_current(topic, inner.delivery.clone());
                    let mut descriptor = SubscriptionDescriptor::new(token);
                    descriptor.explicit = true;
                    table.topics.insert(topic.to_string(), descriptor);
                    current
                }
            }
        };

        tracing::debug!(client_id = %inner.client_id, topic = %topic, "Topic subscribed");

        if let Some(record) = current {
            (inner.delivery)(&record);
        }
        true
    }

    /// Drop the by-name subscription to a topic
    ///
    /// The store subscription survives while a pattern still matches the topic.
    pub fn unsubscribe_topic(&self, topic: &str) -> Result<(), SubscriptionError> {
        let inner = &self.inner;
        let mut table = inner.table.lock();

        let Some(descriptor) = table.topics.get_mut(topic).filter(|d| d.explicit) else {
            return Err(SubscriptionError::NotSubscribed(topic.to_string()));
        };
        descriptor.explicit = false;

        if !descriptor.is_referenced() {
            if let Some(descriptor) = table.topics.remove(topic) {
                inner.store.unsubscribe(descriptor.token);
            }
            tracing::debug!(client_id = %inner.client_id, topic = %topic, "Topic unsubscribed");
        } else {
            tracing::debug!(
                client_id = %inner.client_id,
                topic = %topic,
                "Topic unsubscribed by name, still matched by pattern"
            );
        }
        Ok(())
    }

    /// Subscribe to all current and future topics matching `pattern`
    pub fn subscribe_regex(&self, pattern: &str) -> Result<PatternId, SubscriptionError> {
        let inner = &self.inner;
        let mut table = inner.table.lock();

        if table.patterns.values().any(|p| p.regex.as_str() == pattern) {
            return Err(SubscriptionError::DuplicatePattern(pattern.to_string()));
        }
        let regex = Regex::new(pattern)?;

        table.next_pattern += 1;
        let id = PatternId(table.next_pattern);

        // Listen before enumerating: a topic created in between is seen at
        // least once, and attaching twice is a no-op.
        let listener = new_topic_listener(Arc::downgrade(inner), id, regex.clone());
        let listener_token = inner.store.on_new_topic(listener);

        let mut matched = 0usize;
        for record in inner.store.topics_with_data() {
            if regex.is_match(&record.topic) {
                inner.attach(&mut table, &record.topic, id);
                matched += 1;
            }
        }

        table.patterns.insert(
            id,
            PatternSubscription {
                regex,
                listener: listener_token,
            },
        );

        tracing::debug!(
            client_id = %inner.client_id,
            pattern = %pattern,
            pattern_id = %id,
            matched,
            "Pattern subscribed"
        );
        Ok(id)
    }

    /// Remove a pattern subscription, releasing topics only it referenced
    pub fn unsubscribe_regex(&self, id: PatternId) -> Result<(), SubscriptionError> {
        let inner = &self.inner;
        let mut table = inner.table.lock();

        let Some(pattern) = table.patterns.remove(&id) else {
            return Err(SubscriptionError::UnknownPattern(id));
        };
        inner.store.remove_new_topic_listener(pattern.listener);

        let mut released = Vec::new();
        table.topics.retain(|_, descriptor| {
            if descriptor.pattern_refs.remove(&id) && !descriptor.is_referenced() {
                released.push(descriptor.token);
                false
            } else {
                true
            }
        });
        for token in &released {
            inner.store.unsubscribe(*token);
        }

        tracing::debug!(
            client_id = %inner.client_id,
            pattern = %pattern.regex.as_str(),
            pattern_id = %id,
            released = released.len(),
            "Pattern unsubscribed"
        );
        Ok(())
    }

    /// Tear down every subscription and pattern listener
    pub fn unsubscribe_all(&self) {
        let inner = &self.inner;
        let mut table = inner.table.lock();

        for (_, pattern) in table.patterns.drain() {
            inner.store.remove_new_topic_listener(pattern.listener);
        }
        let released = table.topics.len();
        for (_, descriptor) in table.topics.drain() {
            inner.store.unsubscribe(descriptor.token);
        }

        if released > 0 {
            tracing::debug!(client_id = %inner.client_id, released, "All subscriptions released");
        }
    }

    /// Id of a registered pattern string
    pub fn pattern_id(&self, pattern: &str) -> Option<PatternId> {
        self.inner
            .table
            .lock()
            .patterns
            .iter()
            .find(|(_, p)| p.regex.as_str() == pattern)
            .map(|(id, _)| *id)
    }

    /// Registered patterns with their ids
    pub fn patterns(&self) -> Vec<(PatternId, String)> {
        let mut patterns: Vec<_> = self
            .inner
            .table
            .lock()
            .patterns
            .iter()
            .map(|(id, p)| (*id, p.regex.as_str().to_string()))
            .collect();
        patterns.sort();
        patterns
    }

    /// Descriptor for a topic, if any source references it
    pub fn descriptor(&self, topic: &str) -> Option<SubscriptionDescriptor> {
        self.inner.table.lock().topics.get(topic).cloned()
    }

    /// Whether the topic is subscribed by name
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner
            .table
            .lock()
            .topics
            .get(topic)
            .is_some_and(|d| d.explicit)
    }

    /// Every topic with a live store subscription, sorted
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.inner.table.lock().topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Number of topics subscribed by name
    pub fn explicit_count(&self) -> usize {
        self.inner
            .table
            .lock()
            .topics
            .values()
            .filter(|d| d.explicit)
            .count()
    }
}

fn new_topic_listener(inner: Weak<EngineInner>, id: PatternId, regex: Regex) -> TopicListener {
    Arc::new(move |topic: &str| {
        if !regex.is_match(topic) {
            return;
        }
        if let Some(inner) = inner.upgrade() {
            inner.attach_new_topic(topic, id);
        }
    })
}
