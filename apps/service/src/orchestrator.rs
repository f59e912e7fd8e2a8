//! Wires the service together and owns its lifecycle.
//!
//! Startup restores subscriptions from the store, then two actors run side by
//! side until the inbound channel closes or the process is interrupted:
//! - the polling scheduler, on its own task
//! - the command handler, consuming inbound chat messages in order

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::monitoring::{A2sQuery, PollingScheduler, RetryPolicy, StatusChecker, StatusQuery};
use crate::notify::FanoutNotifier;
use crate::registry::{EndpointRegistry, SubscriptionRegistry};
use crate::storage::{JsonFileStore, SubscriptionStore};
use crate::transport::{InboundMessage, MessageTransport, TelegramTransport};

const INBOUND_QUEUE: usize = 64;

/// Main orchestrator for the srvwatch service
pub struct Orchestrator {
    subscriptions: Arc<SubscriptionRegistry>,
    scheduler: Arc<PollingScheduler>,
    commands: Arc<CommandHandler>,
}

impl Orchestrator {
    /// Build the Telegram-backed service from `config` and run it until interrupted
    pub async fn start(config: Config) -> Result<()> {
        let token = config
            .telegram
            .token
            .clone()
            .ok_or_else(|| anyhow!("No bot token configured, set BOT_TOKEN or telegram.token"))?;

        let telegram = Arc::new(
            TelegramTransport::from_config(&config.telegram, &token).context("Failed to create Telegram client")?,
        );
        let store = Arc::new(JsonFileStore::new(&config.storage.path));
        info!(path = %store.path().display(), "Using subscription store");
        let query = Arc::new(A2sQuery::new());

        let (tx, rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE);
        let polling = telegram.clone().spawn_polling(tx);

        let orchestrator = Self::new(&config, telegram, query, store).await;
        let result = orchestrator.run(rx).await;

        polling.abort();
        result
    }

    /// Create the registries and actors, restoring persisted subscriptions.
    ///
    /// A store that cannot be read is logged and the service starts empty.
    pub async fn new(
        config: &Config,
        transport: Arc<dyn MessageTransport>,
        query: Arc<dyn StatusQuery>,
        store: Arc<dyn SubscriptionStore>,
    ) -> Self {
        let endpoints = Arc::new(EndpointRegistry::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new(endpoints.clone()));

        info!("Loading subscriptions...");
        match store.load().await {
            Ok(snapshot) => {
                let chats = snapshot.len();
                let restored = subscriptions.restore(snapshot).await;
                info!("Restored {} subscriptions for {} chats", restored, chats);
            }
            Err(e) => warn!("Failed to load subscriptions, starting empty: {}", e),
        }

        let checker = Arc::new(StatusChecker::new(query, RetryPolicy::from(&config.monitoring)));
        let notifier = Arc::new(FanoutNotifier::new(subscriptions.clone(), transport.clone()));
        let scheduler = Arc::new(PollingScheduler::new(
            endpoints,
            checker.clone(),
            notifier.clone(),
            Duration::from_secs(config.monitoring.period_seconds),
        ));
        let commands = Arc::new(CommandHandler::new(subscriptions.clone(), checker, notifier, transport, store));

        Self { subscriptions, scheduler, commands }
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    pub fn scheduler(&self) -> &Arc<PollingScheduler> {
        &self.scheduler
    }

    pub fn commands(&self) -> &Arc<CommandHandler> {
        &self.commands
    }

    /// Run both actors until `rx` closes or Ctrl-C is received
    pub async fn run(self, rx: mpsc::Receiver<InboundMessage>) -> Result<()> {
        info!("Starting srvwatch orchestrator...");

        let scheduler = self.scheduler.clone().start();

        let result = tokio::select! {
            () = self.commands.clone().run(rx) => Ok(()),
            signal = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                signal.context("Failed to listen for shutdown signal")
            }
        };

        scheduler.abort();
        info!("Orchestrator stopped");
        result
    }
}
