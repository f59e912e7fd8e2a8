use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::endpoints::{Endpoint, EndpointRegistry};
use crate::monitoring::types::EndpointKey;

/// Maximum number of endpoints one subscriber may watch
pub const MAX_ENDPOINTS_PER_SUBSCRIBER: usize = 16;

/// Chat or channel identifier on the messaging side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber to endpoint mapping as it is persisted
pub type SubscriptionSnapshot = BTreeMap<ChatId, Vec<EndpointKey>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("You can monitor at most {limit} servers, remove one with `/del hostname port` first")]
    CapacityExceeded { limit: usize },
}

/// Endpoints watched by one chat, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriber {
    endpoints: Vec<EndpointKey>,
}

impl Subscriber {
    pub fn endpoints(&self) -> &[EndpointKey] {
        &self.endpoints
    }

    pub fn watches(&self, key: &EndpointKey) -> bool {
        self.endpoints.contains(key)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Result of a successful add
#[derive(Debug, Clone)]
pub enum AddOutcome {
    Added(Arc<Endpoint>),
    AlreadyPresent(Arc<Endpoint>),
}

impl AddOutcome {
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        match self {
            AddOutcome::Added(endpoint) | AddOutcome::AlreadyPresent(endpoint) => endpoint,
        }
    }
}

/// Many-to-many mapping between chats and endpoints.
///
/// Lock order is subscribers first, then the endpoint registry. Adds and removals
/// both hold the subscriber lock across the endpoint registry call so an endpoint
/// cannot be evicted while another chat is adding it.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    endpoints: Arc<EndpointRegistry>,
    subscribers: RwLock<HashMap<ChatId, Subscriber>>,
}

impl SubscriptionRegistry {
    pub fn new(endpoints: Arc<EndpointRegistry>) -> Self {
        Self { endpoints, subscribers: RwLock::new(HashMap::new()) }
    }

    pub fn endpoint_registry(&self) -> &Arc<EndpointRegistry> {
        &self.endpoints
    }

    pub async fn get_or_create_subscriber(&self, id: ChatId) -> Subscriber {
        if let Some(subscriber) = self.subscribers.read().await.get(&id) {
            return subscriber.clone();
        }

        self.subscribers.write().await.entry(id).or_default().clone()
    }

    /// Watch `key` from `id`, creating the endpoint on first reference
    pub async fn add_endpoint(&self, id: ChatId, key: &EndpointKey) -> Result<AddOutcome, RegistryError> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers.entry(id).or_default();

        if subscriber.len() >= MAX_ENDPOINTS_PER_SUBSCRIBER {
            return Err(RegistryError::CapacityExceeded { limit: MAX_ENDPOINTS_PER_SUBSCRIBER });
        }

        let endpoint = self.endpoints.get_or_create(key).await;

        if subscriber.watches(key) {
            return Ok(AddOutcome::AlreadyPresent(endpoint));
        }

        subscriber.endpoints.push(key.clone());
        debug!(chat_id = %id, endpoint = %key, "Subscribed");
        Ok(AddOutcome::Added(endpoint))
    }

    /// Stop watching `key` from `id`. Evicts the endpoint once no chat references it.
    pub async fn remove_endpoint(&self, id: ChatId, key: &EndpointKey) -> bool {
        let mut subscribers = self.subscribers.write().await;

        let found = match subscribers.get_mut(&id) {
            Some(subscriber) => {
                let before = subscriber.endpoints.len();
                subscriber.endpoints.retain(|k| k != key);
                subscriber.endpoints.len() != before
            }
            None => false,
        };

        if found {
            debug!(chat_id = %id, endpoint = %key, "Unsubscribed");
            if !subscribers.values().any(|s| s.watches(key)) {
                self.endpoints.remove(key).await;
            }
        }

        found
    }

    /// Endpoints watched by `id` in registration order
    pub async fn list_endpoints(&self, id: ChatId) -> Vec<Arc<Endpoint>> {
        let subscribers = self.subscribers.read().await;
        let Some(subscriber) = subscribers.get(&id) else {
            return Vec::new();
        };

        let mut endpoints = Vec::with_capacity(subscriber.len());
        for key in subscriber.endpoints() {
            match self.endpoints.get(key).await {
                Some(endpoint) => endpoints.push(endpoint),
                None => warn!(chat_id = %id, endpoint = %key, "Subscribed endpoint missing from registry"),
            }
        }
        endpoints
    }

    /// Chats currently watching `key`
    pub async fn subscribers_of(&self, key: &EndpointKey) -> Vec<ChatId> {
        let subscribers = self.subscribers.read().await;
        let mut ids: Vec<_> = subscribers
            .iter()
            .filter(|(_, subscriber)| subscriber.watches(key))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Mapping of every chat with at least one endpoint
    pub async fn snapshot(&self) -> SubscriptionSnapshot {
        self.subscribers
            .read()
            .await
            .iter()
            .filter(|(_, subscriber)| !subscriber.is_empty())
            .map(|(id, subscriber)| (*id, subscriber.endpoints.clone()))
            .collect()
    }

    /// Rebuild subscriptions from persisted state, returning the number of
    /// subscriptions restored
    pub async fn restore(&self, snapshot: SubscriptionSnapshot) -> usize {
        let mut restored = 0;

        for (id, keys) in snapshot {
            for key in keys {
                match self.add_endpoint(id, &key).await {
                    Ok(AddOutcome::Added(_)) => restored += 1,
                    Ok(AddOutcome::AlreadyPresent(_)) => {
                        debug!(chat_id = %id, endpoint = %key, "Duplicate stored subscription collapsed");
                    }
                    Err(e) => {
                        warn!(chat_id = %id, endpoint = %key, "Dropping stored subscription: {}", e);
                    }
                }
            }
        }

        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::new(Arc::new(EndpointRegistry::new()))
    }

    fn key(n: u16) -> EndpointKey {
        EndpointKey::new(format!("srv{n}.example.com"), 27015)
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let registry = registry();
        let chat = ChatId(1);

        assert!(matches!(registry.add_endpoint(chat, &key(1)).await, Ok(AddOutcome::Added(_))));
        assert!(matches!(registry.add_endpoint(chat, &key(1)).await, Ok(AddOutcome::AlreadyPresent(_))));

        assert_eq!(registry.list_endpoints(chat).await.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_limit_rejects_seventeenth() {
        let registry = registry();
        let chat = ChatId(2);

        for n in 0..16 {
            registry.add_endpoint(chat, &key(n)).await.unwrap();
        }

        let rejected = registry.add_endpoint(chat, &key(16)).await;
        assert_eq!(rejected.unwrap_err(), RegistryError::CapacityExceeded { limit: 16 });
        assert_eq!(registry.list_endpoints(chat).await.len(), 16);
        assert!(!registry.endpoint_registry().contains(&key(16)).await);
    }

    #[tokio::test]
    async fn test_shared_endpoint_instance() {
        let registry = registry();
        let a = registry.add_endpoint(ChatId(1), &key(1)).await.unwrap();
        let b = registry.add_endpoint(ChatId(2), &key(1)).await.unwrap();

        assert!(Arc::ptr_eq(a.endpoint(), b.endpoint()));
        assert_eq!(registry.endpoint_registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_last_reference_evicts_endpoint() {
        let registry = registry();
        registry.add_endpoint(ChatId(1), &key(1)).await.unwrap();

        assert!(registry.remove_endpoint(ChatId(1), &key(1)).await);
        assert!(!registry.endpoint_registry().contains(&key(1)).await);
    }

    #[tokio::test]
    async fn test_remove_non_last_reference_keeps_state() {
        let registry = registry();
        let added = registry.add_endpoint(ChatId(1), &key(1)).await.unwrap();
        registry.add_endpoint(ChatId(2), &key(1)).await.unwrap();
        added.endpoint().apply(None, Utc::now()).await;

        assert!(registry.remove_endpoint(ChatId(1), &key(1)).await);

        let remaining = registry.endpoint_registry().get(&key(1)).await.unwrap();
        assert!(remaining.message().await.is_some());
        assert_eq!(registry.subscribers_of(&key(1)).await, vec![ChatId(2)]);
    }

    #[tokio::test]
    async fn test_remove_missing_entry() {
        let registry = registry();
        registry.add_endpoint(ChatId(1), &key(1)).await.unwrap();

        assert!(!registry.remove_endpoint(ChatId(1), &key(2)).await);
        assert!(!registry.remove_endpoint(ChatId(9), &key(1)).await);
        assert!(registry.endpoint_registry().contains(&key(1)).await);
    }

    #[tokio::test]
    async fn test_list_preserves_registration_order() {
        let registry = registry();
        for n in [3, 1, 2] {
            registry.add_endpoint(ChatId(1), &key(n)).await.unwrap();
        }

        let keys: Vec<_> = registry
            .list_endpoints(ChatId(1))
            .await
            .iter()
            .map(|e| e.key().clone())
            .collect();
        assert_eq!(keys, vec![key(3), key(1), key(2)]);
    }

    #[tokio::test]
    async fn test_subscribers_of_reflects_current_state() {
        let registry = registry();
        registry.add_endpoint(ChatId(1), &key(1)).await.unwrap();
        registry.add_endpoint(ChatId(2), &key(1)).await.unwrap();
        registry.add_endpoint(ChatId(3), &key(2)).await.unwrap();

        assert_eq!(registry.subscribers_of(&key(1)).await, vec![ChatId(1), ChatId(2)]);

        registry.remove_endpoint(ChatId(2), &key(1)).await;
        assert_eq!(registry.subscribers_of(&key(1)).await, vec![ChatId(1)]);
    }

    #[tokio::test]
    async fn test_snapshot_and_restore() {
        let registry = registry();
        registry.get_or_create_subscriber(ChatId(5)).await;
        registry.add_endpoint(ChatId(1), &key(2)).await.unwrap();
        registry.add_endpoint(ChatId(1), &key(1)).await.unwrap();

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&ChatId(1)], vec![key(2), key(1)]);

        let fresh = SubscriptionRegistry::new(Arc::new(EndpointRegistry::new()));
        assert_eq!(fresh.restore(snapshot.clone()).await, 2);
        assert_eq!(fresh.snapshot().await, snapshot);
    }

    #[tokio::test]
    async fn test_restore_truncates_over_capacity() {
        let registry = registry();
        let mut snapshot = SubscriptionSnapshot::new();
        snapshot.insert(ChatId(1), (0..20).map(key).chain([key(0)]).collect());

        assert_eq!(registry.restore(snapshot).await, 16);
        assert_eq!(registry.list_endpoints(ChatId(1)).await.len(), 16);
    }
}
