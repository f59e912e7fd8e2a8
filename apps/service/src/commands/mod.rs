//! Command actor.
//!
//! Inbound chat messages are handled one at a time in arrival order. Every
//! command gets a reply; commands that mutate subscriptions persist the new
//! state before replying with a status.

mod parse;

pub use parse::{Command, CommandError, REGISTER_HINT};

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::monitoring::StatusChecker;
use crate::monitoring::types::EndpointKey;
use crate::notify::FanoutNotifier;
use crate::registry::{AddOutcome, ChatId, Endpoint, SubscriptionRegistry};
use crate::storage::SubscriptionStore;
use crate::transport::{InboundMessage, MessageTransport};

pub const HELP_TEXT: &str = "Game server state checking bot\n\
    /reg hostname port - watch a server (alias /add)\n\
    /state - check your servers now\n\
    /list - show watched servers\n\
    /del hostname port - stop watching a server";

pub struct CommandHandler {
    subscriptions: Arc<SubscriptionRegistry>,
    checker: Arc<StatusChecker>,
    notifier: Arc<FanoutNotifier>,
    transport: Arc<dyn MessageTransport>,
    store: Arc<dyn SubscriptionStore>,
}

impl CommandHandler {
    pub fn new(
        subscriptions: Arc<SubscriptionRegistry>,
        checker: Arc<StatusChecker>,
        notifier: Arc<FanoutNotifier>,
        transport: Arc<dyn MessageTransport>,
        store: Arc<dyn SubscriptionStore>,
    ) -> Self {
        Self { subscriptions, checker, notifier, transport, store }
    }

    /// Process messages until the channel closes.
    ///
    /// Each message runs on its own task which is awaited before the next one
    /// starts, so a panic inside one command is logged and the actor keeps going.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<InboundMessage>) {
        info!("Command handler started");

        while let Some(message) = rx.recv().await {
            let chat_id = message.chat_id;
            let handler = self.clone();

            if let Err(e) = tokio::spawn(async move { handler.handle(message).await }).await {
                error!(chat_id = %chat_id, "Command aborted: {}", e);
            }
        }

        info!("Inbound channel closed, command handler stopped");
    }

    pub async fn handle(&self, message: InboundMessage) {
        let chat_id = message.chat_id;
        debug!(chat_id = %chat_id, sender = %message.sender, text = %message.text, "Handling command");

        self.subscriptions.get_or_create_subscriber(chat_id).await;

        match Command::parse(&message.text) {
            Ok(Command::Register(key)) => self.register(chat_id, key).await,
            Ok(Command::State) => self.state(chat_id).await,
            Ok(Command::List) => self.list(chat_id).await,
            Ok(Command::Delete(key)) => self.delete(chat_id, key).await,
            Ok(Command::Help) => self.reply(chat_id, HELP_TEXT).await,
            Err(e) => self.reply(chat_id, &e.to_string()).await,
        }
    }

    async fn register(&self, chat_id: ChatId, key: EndpointKey) {
        match self.subscriptions.add_endpoint(chat_id, &key).await {
            Ok(AddOutcome::Added(endpoint)) => {
                info!(chat_id = %chat_id, endpoint = %key, "Server registered");
                self.persist().await;
                self.check_on_demand(chat_id, &endpoint).await;
            }
            Ok(AddOutcome::AlreadyPresent(_)) => {
                self.reply(chat_id, &format!("Server {key} is already monitored")).await;
            }
            Err(e) => {
                info!(chat_id = %chat_id, endpoint = %key, "Registration rejected: {}", e);
                self.reply(chat_id, &e.to_string()).await;
            }
        }
    }

    async fn state(&self, chat_id: ChatId) {
        let endpoints = self.subscriptions.list_endpoints(chat_id).await;
        if endpoints.is_empty() {
            self.reply(chat_id, REGISTER_HINT).await;
            return;
        }

        for endpoint in endpoints {
            self.check_on_demand(chat_id, &endpoint).await;
        }
    }

    async fn list(&self, chat_id: ChatId) {
        let endpoints = self.subscriptions.list_endpoints(chat_id).await;
        if endpoints.is_empty() {
            self.reply(chat_id, &format!("No servers registered. {REGISTER_HINT}")).await;
            return;
        }

        let listing = endpoints.iter().map(|e| e.key().to_string()).collect::<Vec<_>>().join(", ");
        self.reply(chat_id, &listing).await;
    }

    async fn delete(&self, chat_id: ChatId, key: EndpointKey) {
        let reply = if self.subscriptions.remove_endpoint(chat_id, &key).await {
            info!(chat_id = %chat_id, endpoint = %key, "Server removed");
            format!("Server {key} removed")
        } else {
            format!("Server {key} is not in your list")
        };

        self.reply(chat_id, &reply).await;
        self.persist().await;
    }

    /// Check `endpoint` now. A change from an earlier message goes to every
    /// subscriber; otherwise only the caller gets the current message.
    async fn check_on_demand(&self, chat_id: ChatId, endpoint: &Endpoint) {
        let outcome = self.checker.check(endpoint).await;

        if outcome.changed && outcome.had_previous {
            self.notifier.notify(endpoint).await;
        } else {
            self.reply(chat_id, &outcome.message).await;
        }
    }

    async fn persist(&self) {
        let snapshot = self.subscriptions.snapshot().await;

        if let Err(e) = self.store.save(&snapshot).await {
            error!("Failed to persist subscriptions: {}", e);
        }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.transport.send_message(chat_id, text).await {
            warn!(chat_id = %chat_id, "Failed to send reply: {}", e);
        }
    }
}
