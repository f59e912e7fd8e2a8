use std::sync::Arc;

use tracing::{debug, warn};

use crate::registry::{Endpoint, SubscriptionRegistry};
use crate::transport::MessageTransport;

/// Delivery counts of one fanout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends an endpoint's current status to every chat watching it
pub struct FanoutNotifier {
    subscriptions: Arc<SubscriptionRegistry>,
    transport: Arc<dyn MessageTransport>,
}

impl FanoutNotifier {
    pub fn new(subscriptions: Arc<SubscriptionRegistry>, transport: Arc<dyn MessageTransport>) -> Self {
        Self { subscriptions, transport }
    }

    /// Deliver the endpoint's rendered message to its current subscribers.
    ///
    /// A failed delivery is logged and does not stop delivery to the others.
    /// An instance that was evicted from the registry while it was being
    /// checked is not announced.
    pub async fn notify(&self, endpoint: &Endpoint) -> FanoutReport {
        let mut report = FanoutReport::default();

        let registered = self.subscriptions.endpoint_registry().get(endpoint.key()).await;
        if !registered.is_some_and(|current| std::ptr::eq(current.as_ref(), endpoint)) {
            debug!(endpoint = %endpoint.key(), "Endpoint no longer registered, skipping fanout");
            return report;
        }

        let Some(message) = endpoint.message().await else {
            return report;
        };

        let recipients = self.subscriptions.subscribers_of(endpoint.key()).await;
        debug!(endpoint = %endpoint.key(), recipients = recipients.len(), "Fanning out status change");

        for chat_id in recipients {
            match self.transport.send_message(chat_id, &message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(chat_id = %chat_id, endpoint = %endpoint.key(), "Failed to deliver status update: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}
