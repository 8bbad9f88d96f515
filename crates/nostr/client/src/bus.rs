//! Publish/subscribe capability consumed by protocol clients.

use crate::error::Result;
use crate::filter::Filter;
use crate::subscription::SubscriptionStream;
use async_trait::async_trait;
use nostr::Event;

/// A message bus that carries signed events between participants.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a signed event. Returns the event id once at least one transport
    /// accepted it.
    async fn publish(&self, event: &Event) -> Result<String>;

    /// Open a filtered subscription. Stored matching events (bounded by
    /// `filter.limit`) are delivered first, then live ones.
    async fn subscribe(&self, filter: Filter) -> Result<SubscriptionStream>;
}
