//! Durable storage of subscriptions.
//!
//! The file is a JSON object keyed by chat id. Each value is the list of watched
//! endpoints; files written by older versions hold a single endpoint object
//! instead and are still understood.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::monitoring::types::EndpointKey;
use crate::registry::{ChatId, SubscriptionSnapshot};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored subscriptions are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load and save the subscription mapping
#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn load(&self) -> Result<SubscriptionSnapshot, StorageError>;

    async fn save(&self, snapshot: &SubscriptionSnapshot) -> Result<(), StorageError>;
}

/// JSON file on local disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io { path: self.path.clone(), source }
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for JsonFileStore {
    async fn load(&self) -> Result<SubscriptionSnapshot, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => decode(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored subscriptions yet");
                Ok(SubscriptionSnapshot::new())
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, snapshot: &SubscriptionSnapshot) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, encoded).await.map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), chats = snapshot.len(), "Subscriptions saved");
        Ok(())
    }
}

/// Decode a stored file, skipping records that match neither known encoding
pub fn decode(raw: &str) -> Result<SubscriptionSnapshot, StorageError> {
    let records: Map<String, Value> = serde_json::from_str(raw)?;
    let mut snapshot = SubscriptionSnapshot::new();

    for (chat, value) in records {
        let Ok(chat_id) = chat.parse::<i64>() else {
            warn!(record = %chat, "Skipping stored record with invalid chat id");
            continue;
        };

        match decode_record(&value) {
            Some(endpoints) => {
                snapshot.insert(ChatId(chat_id), endpoints);
            }
            None => warn!(chat_id, "Skipping stored record in unknown format"),
        }
    }

    Ok(snapshot)
}

fn decode_record(value: &Value) -> Option<Vec<EndpointKey>> {
    match value {
        Value::Array(items) if items.iter().all(Value::is_object) => Vec::<EndpointKey>::deserialize(value).ok(),
        Value::Object(_) => EndpointKey::deserialize(value).ok().map(|legacy| vec![legacy]),
        _ => None,
    }
}
