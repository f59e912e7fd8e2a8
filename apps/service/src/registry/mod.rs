/// Shared in-memory state of the service
///
/// - `endpoints`: one canonical [`Endpoint`] per (host, port) with its last known status
/// - `subscriptions`: which chats watch which endpoints, with orphan cleanup
pub mod endpoints;
pub mod subscriptions;

pub use endpoints::{Endpoint, EndpointRegistry};
pub use subscriptions::{
    AddOutcome, ChatId, MAX_ENDPOINTS_PER_SUBSCRIBER, RegistryError, Subscriber, SubscriptionRegistry,
    SubscriptionSnapshot,
};
