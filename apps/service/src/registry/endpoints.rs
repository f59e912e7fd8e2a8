use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::monitoring::types::{CheckOutcome, EndpointKey, EndpointStatus, StatusInfo};

/// A monitored server with its shared status.
///
/// Every subscriber watching the same key observes this one instance.
#[derive(Debug)]
pub struct Endpoint {
    key: EndpointKey,
    status: Mutex<EndpointStatus>,
}

impl Endpoint {
    pub fn new(key: EndpointKey) -> Self {
        Self { key, status: Mutex::new(EndpointStatus::default()) }
    }

    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    /// Snapshot of the current status
    pub async fn status(&self) -> EndpointStatus {
        self.status.lock().await.clone()
    }

    /// Currently rendered status text
    pub async fn message(&self) -> Option<String> {
        self.status.lock().await.message.clone()
    }

    pub async fn record_attempt(&self, at: DateTime<Utc>) {
        self.status.lock().await.record_attempt(at);
    }

    /// Store the result of a finished check; the comparison against the previous
    /// message happens under the same lock as the update.
    pub async fn apply(&self, info: Option<StatusInfo>, at: DateTime<Utc>) -> CheckOutcome {
        self.status.lock().await.apply(&self.key, info, at)
    }
}

/// Deduplicated store of monitored endpoints keyed by (host, port)
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<HashMap<EndpointKey, Arc<Endpoint>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the endpoint for `key`, creating it with an empty status if needed
    pub async fn get_or_create(&self, key: &EndpointKey) -> Arc<Endpoint> {
        if let Some(endpoint) = self.endpoints.read().await.get(key) {
            return endpoint.clone();
        }

        let mut endpoints = self.endpoints.write().await;
        endpoints
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(host = %key.host, port = key.port, "Registering endpoint");
                Arc::new(Endpoint::new(key.clone()))
            })
            .clone()
    }

    pub async fn get(&self, key: &EndpointKey) -> Option<Arc<Endpoint>> {
        self.endpoints.read().await.get(key).cloned()
    }

    /// Drop the entry for `key`. Callers make sure nothing references it anymore.
    pub async fn remove(&self, key: &EndpointKey) {
        if self.endpoints.write().await.remove(key).is_some() {
            debug!(host = %key.host, port = key.port, "Evicted orphaned endpoint");
        }
    }

    /// Snapshot of all endpoints; the registry lock is released before returning
    pub async fn all(&self) -> Vec<Arc<Endpoint>> {
        let mut endpoints: Vec<_> = self.endpoints.read().await.values().cloned().collect();
        endpoints.sort_by(|a, b| a.key().cmp(b.key()));
        endpoints
    }

    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    pub async fn contains(&self, key: &EndpointKey) -> bool {
        self.endpoints.read().await.contains_key(key)
    }
}
