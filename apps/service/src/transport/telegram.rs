use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{InboundMessage, MessageTransport, TransportError};
use crate::config::Telegram;
use crate::registry::ChatId;

/// Pause after a failed `getUpdates` call
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Headroom on top of the long-poll timeout for the HTTP client
const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

impl Update {
    /// Text messages only; everything else is ignored by the bot
    fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;
        let text = message.text?;
        let sender = message
            .from
            .map(|user| user.username.unwrap_or(user.first_name))
            .unwrap_or_default();

        Some(InboundMessage::new(ChatId(message.chat.id), sender, text))
    }
}

/// Telegram Bot API client
pub struct TelegramTransport {
    client: Client,
    base_url: String,
    poll_timeout: Duration,
}

impl TelegramTransport {
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(poll_timeout + HTTP_TIMEOUT_SLACK).build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            poll_timeout,
        })
    }

    pub fn from_config(config: &Telegram, token: &str) -> Result<Self, TransportError> {
        Self::new(&config.api_url, token, Duration::from_secs(config.poll_timeout_seconds))
    }

    async fn call<B: Serialize, T: DeserializeOwned>(&self, method: &str, body: &B) -> Result<T, TransportError> {
        let response: ApiResponse<T> = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await?
            .json()
            .await?;

        match response {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { error_code, description, .. } => Err(TransportError::Api {
                code: error_code.unwrap_or_default(),
                description: description.unwrap_or_else(|| format!("{method} returned no result")),
            }),
        }
    }

    /// Fetch updates after `offset`, waiting up to `timeout` for new ones
    pub async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            &GetUpdates { offset, timeout: timeout.as_secs(), allowed_updates: ["message"] },
        )
        .await
    }

    /// Offset just past the updates queued while the bot was offline
    pub async fn skip_pending(&self) -> Result<Option<i64>, TransportError> {
        let pending = self.get_updates(Some(-1), Duration::ZERO).await?;
        Ok(pending.last().map(|update| update.update_id + 1))
    }

    /// Long-poll for messages and forward them to `tx` until the receiver is dropped
    pub fn spawn_polling(self: Arc<Self>, tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut offset = match self.skip_pending().await {
                Ok(offset) => offset,
                Err(e) => {
                    warn!("Failed to skip pending updates: {}", e);
                    None
                }
            };

            info!("Telegram polling started");

            loop {
                let updates = match self.get_updates(offset, self.poll_timeout).await {
                    Ok(updates) => updates,
                    Err(e) => {
                        warn!("getUpdates failed: {}", e);
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                for update in updates {
                    offset = Some(update.update_id + 1);

                    let Some(message) = update.into_inbound() else {
                        continue;
                    };

                    debug!(chat_id = %message.chat_id, sender = %message.sender, "Inbound message");
                    if tx.send(message).await.is_err() {
                        info!("Command handler gone, stopping Telegram polling");
                        return;
                    }
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl MessageTransport for TelegramTransport {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        let _: serde_json::Value = self.call("sendMessage", &SendMessage { chat_id: chat_id.0, text }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> TelegramTransport {
        TelegramTransport::new(&server.uri(), "TOKEN", Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn test_send_message_posts_chat_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_json(json!({ "chat_id": -100123, "text": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": { "message_id": 1 } })))
            .expect(1)
            .mount(&server)
            .await;

        transport(&server).send_message(ChatId(-100123), "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_message_surfaces_api_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "ok": false,
                "error_code": 403,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&server)
            .await;

        let err = transport(&server).send_message(ChatId(7), "hi").await.unwrap_err();
        match err {
            TransportError::Api { code, description } => {
                assert_eq!(code, 403);
                assert!(description.contains("blocked"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_polling_forwards_text_messages_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_json(json!({ "offset": -1, "timeout": 0, "allowed_updates": ["message"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [{ "update_id": 41, "message": { "chat": { "id": 5 }, "text": "/old" } }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_json(json!({ "offset": 42, "timeout": 1, "allowed_updates": ["message"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    { "update_id": 42, "message": { "chat": { "id": 5 }, "from": { "first_name": "Ann" } } },
                    { "update_id": 43, "message": { "chat": { "id": 5 }, "from": { "first_name": "Ann", "username": "ann" }, "text": "/list" } }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_json(json!({ "offset": 44, "timeout": 1, "allowed_updates": ["message"] })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": true, "result": [] }))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(8);
        let handle = Arc::new(transport(&server)).spawn_polling(tx);

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(message, InboundMessage::new(ChatId(5), "ann", "/list"));

        handle.abort();
    }
}
