//! Durable subscription registry
//!
//! Survives reconnects. Every `add` yields a fresh id, so two subscriptions
//! to the same topic are independent and separately removable.

use super::buffer::InboundMessage;
use std::fmt;
use std::sync::Arc;

/// Callback invoked for each delivered message, in arrival order
pub type Handler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Stable subscription identifier, reused on every replay
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: String,
    pub handler: Handler,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: u64,
    // insertion order is replay order
    entries: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, topic: &str, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(format!("sub-{}", self.next_id));
        self.entries.push(Subscription {
            id: id.clone(),
            topic: topic.to_string(),
            handler,
        });
        id
    }

    pub fn remove(&mut self, id: &SubscriptionId) -> Option<Subscription> {
        let index = self.entries.iter().position(|s| &s.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, id: &SubscriptionId) -> Option<&Subscription> {
        self.entries.iter().find(|s| &s.id == id)
    }

    /// Subscriptions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handlers for an inbound MESSAGE: the subscription named by its
    /// `subscription` header, else every subscription on its destination
    pub fn handlers_for(&self, subscription: Option<&str>, destination: &str) -> Vec<Handler> {
        if let Some(sub) = subscription.and_then(|id| self.entries.iter().find(|s| s.id.0 == id)) {
            return vec![sub.handler.clone()];
        }
        self.entries
            .iter()
            .filter(|s| s.topic == destination)
            .map(|s| s.handler.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> Handler {
        Arc::new(|_| {})
    }

    fn message(topic: &str, subscription: Option<&str>) -> InboundMessage {
        InboundMessage {
            topic: topic.to_string(),
            message_id: None,
            subscription: subscription.map(str::to_string),
            payload: bytes::Bytes::from_static(b"x"),
            arrival_sequence: 1,
            received_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_add_assigns_fresh_ids_per_call() {
        let mut registry = SubscriptionRegistry::new();
        let first = registry.add("/topic/chat/1", noop());
        let second = registry.add("/topic/chat/1", noop());
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        registry.remove(&first).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&second).is_some());
    }

    #[test]
    fn test_ids_not_reused_after_remove() {
        let mut registry = SubscriptionRegistry::new();
        let first = registry.add("/topic/a", noop());
        registry.remove(&first);
        let second = registry.add("/topic/a", noop());
        assert_ne!(first, second);
        assert!(registry.remove(&first).is_none());
    }

    #[test]
    fn test_iter_preserves_registration_order() {
        let mut registry = SubscriptionRegistry::new();
        registry.add("/topic/chat/2", noop());
        registry.add("/topic/chat/1", noop());
        registry.add("/topic/chat/3", noop());
        let topics: Vec<&str> = registry.iter().map(|s| s.topic.as_str()).collect();
        assert_eq!(topics, vec!["/topic/chat/2", "/topic/chat/1", "/topic/chat/3"]);
    }

    #[test]
    fn test_handlers_routed_by_subscription_header() {
        let mut registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = {
            let hits = hits.clone();
            Arc::new(move |_: &InboundMessage| {
                hits.fetch_add(1, Ordering::SeqCst);
            }) as Handler
        };
        let first = registry.add("/topic/chat/1", counted);
        registry.add("/topic/chat/1", noop());

        let handlers = registry.handlers_for(Some(first.as_str()), "/topic/chat/1");
        assert_eq!(handlers.len(), 1);
        for handler in &handlers {
            handler(&message("/topic/chat/1", Some(first.as_str())));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handlers_fall_back_to_destination() {
        let mut registry = SubscriptionRegistry::new();
        registry.add("/topic/chat/1", noop());
        registry.add("/topic/chat/1", noop());
        registry.add("/topic/chat/2", noop());

        assert_eq!(registry.handlers_for(None, "/topic/chat/1").len(), 2);
        assert_eq!(registry.handlers_for(Some("sub-99"), "/topic/chat/2").len(), 1);
        assert!(registry.handlers_for(None, "/topic/other").is_empty());
    }
}
