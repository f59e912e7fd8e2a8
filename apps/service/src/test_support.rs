//! Fakes shared by unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::monitoring::query::{QueryError, StatusQuery};
use crate::monitoring::types::StatusInfo;
use crate::registry::ChatId;
use crate::transport::{MessageTransport, TransportError};

/// Answers queries from a script, then times out forever. Hosts marked with
/// `panic_on` panic instead.
pub struct ScriptedQuery {
    script: Mutex<VecDeque<Result<StatusInfo, QueryError>>>,
    panicking: Mutex<HashSet<String>>,
    timeouts: Mutex<Vec<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedQuery {
    pub fn new(script: Vec<Result<StatusInfo, QueryError>>) -> Self {
        Self { script: Mutex::new(script.into()), panicking: Mutex::default(), timeouts: Mutex::default(), calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    pub fn push(&self, result: Result<StatusInfo, QueryError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn panic_on(&self, host: &str) {
        self.panicking.lock().unwrap().insert(host.to_string());
    }

    /// Timeout passed to each query, in call order
    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StatusQuery for ScriptedQuery {
    async fn query(&self, host: &str, _port: u16, timeout: Duration) -> Result<StatusInfo, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.timeouts.lock().unwrap().push(timeout);
        if self.panicking.lock().unwrap().contains(host) {
            panic!("query for {host} blew up");
        }
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| Err(QueryError::Timeout(timeout)))
    }
}

/// Records every delivered message; chats marked with `fail_for` are rejected
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ChatId, String)>>,
    failing: Mutex<HashSet<ChatId>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, chat_id: ChatId) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<ChatId> {
        self.sent().into_iter().map(|(chat_id, _)| chat_id).collect()
    }

    pub fn messages_for(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl MessageTransport for RecordingTransport {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        if self.failing.lock().unwrap().contains(&chat_id) {
            return Err(TransportError::Api { code: 403, description: "Forbidden: bot was blocked by the user".into() });
        }

        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}
