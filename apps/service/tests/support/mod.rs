//! Fakes for the end-to-end tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use srvwatch::config::Config;
use srvwatch::monitoring::{QueryError, StatusInfo, StatusQuery};
use srvwatch::orchestrator::Orchestrator;
use srvwatch::registry::{ChatId, SubscriptionSnapshot};
use srvwatch::storage::{StorageError, SubscriptionStore};
use srvwatch::transport::{InboundMessage, MessageTransport, TransportError};

pub fn server_info(map: &str, players: u32) -> StatusInfo {
    StatusInfo {
        name: "Test Server".to_string(),
        map: map.to_string(),
        game: "cs".to_string(),
        player_count: players,
        max_players: 32,
    }
}

/// Per-endpoint scripted replies; unscripted queries time out
#[derive(Default)]
pub struct FakeServers {
    replies: Mutex<HashMap<(String, u16), VecDeque<Result<StatusInfo, QueryError>>>>,
}

impl FakeServers {
    pub fn reply(&self, host: &str, port: u16, result: Result<StatusInfo, QueryError>) {
        self.replies.lock().unwrap().entry((host.to_string(), port)).or_default().push_back(result);
    }
}

#[async_trait::async_trait]
impl StatusQuery for FakeServers {
    async fn query(&self, host: &str, port: u16, timeout: Duration) -> Result<StatusInfo, QueryError> {
        self.replies
            .lock()
            .unwrap()
            .get_mut(&(host.to_string(), port))
            .and_then(VecDeque::pop_front)
            .unwrap_or(Err(QueryError::Timeout(timeout)))
    }
}

#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<(ChatId, String)>>,
}

impl Outbox {
    pub fn take(&self) -> Vec<(ChatId, String)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait::async_trait]
impl MessageTransport for Outbox {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<SubscriptionSnapshot>,
}

#[async_trait::async_trait]
impl SubscriptionStore for MemoryStore {
    async fn load(&self) -> Result<SubscriptionSnapshot, StorageError> {
        Ok(self.saved.lock().unwrap().clone())
    }

    async fn save(&self, snapshot: &SubscriptionSnapshot) -> Result<(), StorageError> {
        *self.saved.lock().unwrap() = snapshot.clone();
        Ok(())
    }
}

pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.monitoring.retry_delay_seconds = 0;
    config.monitoring.query_timeout_seconds = 1;
    config
}

pub struct Harness {
    pub servers: Arc<FakeServers>,
    pub outbox: Arc<Outbox>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub async fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        let servers = Arc::new(FakeServers::default());
        let outbox = Arc::new(Outbox::default());
        let orchestrator = Orchestrator::new(&fast_config(), outbox.clone(), servers.clone(), store).await;

        Self { servers, outbox, orchestrator }
    }

    pub async fn send(&self, chat: i64, text: &str) {
        self.orchestrator.commands().handle(InboundMessage::new(ChatId(chat), "tester", text)).await;
    }
}
