//! Relay pool for multi-relay fanout.

use crate::bus::MessageBus;
use crate::error::{ClientError, Result};
use crate::filter::Filter;
use crate::relay::{PublishConfirmation, RelayConfig, RelayConnection};
use crate::subscription::{Subscription, SubscriptionStream};
use async_trait::async_trait;
use nostr::Event;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Relay pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of relays in the pool.
    pub max_relays: usize,
    /// Relay configuration template.
    pub relay_config: RelayConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_relays: 16,
            relay_config: RelayConfig::default(),
        }
    }
}

type RelayMap = Arc<RwLock<HashMap<String, Arc<RelayConnection>>>>;

/// Multi-relay pool. Publishes go to every relay; subscriptions are opened on
/// every relay and merged into one de-duplicated stream.
pub struct RelayPool {
    relays: RelayMap,
    config: PoolConfig,
}

impl RelayPool {
    /// Create new relay pool.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            relays: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Add relay URL to pool (not connected until `connect_all` or `connect_relay`).
    pub async fn add_relay(&self, url: &str) -> Result<()> {
        let mut relays = self.relays.write().await;
        if relays.contains_key(url) {
            return Ok(());
        }
        if relays.len() >= self.config.max_relays {
            return Err(ClientError::Internal(format!(
                "maximum relay limit ({}) reached",
                self.config.max_relays
            )));
        }
        let relay = RelayConnection::with_config(url, self.config.relay_config.clone())?;
        relays.insert(url.to_string(), Arc::new(relay));
        Ok(())
    }

    /// Connect a specific relay.
    pub async fn connect_relay(&self, url: &str) -> Result<()> {
        let relay = self
            .relay(url)
            .await
            .ok_or_else(|| ClientError::InvalidRequest(format!("unknown relay: {}", url)))?;
        relay.connect().await
    }

    /// Connect all relays. Succeeds if at least one relay connected.
    pub async fn connect_all(&self) -> Result<()> {
        let mut successful = 0usize;
        for relay in self.snapshot().await {
            match relay.connect().await {
                Ok(()) => successful += 1,
                Err(error) => warn!("relay connect failed for {}: {}", relay.url(), error),
            }
        }
        if successful == 0 {
            return Err(ClientError::Connection(
                "failed to connect to any relay".to_string(),
            ));
        }
        Ok(())
    }

    /// Disconnect all relays.
    pub async fn disconnect_all(&self) -> Result<()> {
        for relay in self.snapshot().await {
            relay.disconnect().await?;
        }
        Ok(())
    }

    /// Publish event to every relay and collect per-relay outcomes.
    pub async fn publish_all(&self, event: &Event) -> Result<Vec<PublishConfirmation>> {
        let relays = self.snapshot().await;
        if relays.is_empty() {
            return Err(ClientError::NotConnected);
        }

        let mut confirmations = Vec::with_capacity(relays.len());
        for relay in relays {
            match relay.publish(event).await {
                Ok(confirmation) => confirmations.push(confirmation),
                Err(error) => confirmations.push(PublishConfirmation {
                    relay_url: relay.url().to_string(),
                    event_id: event.id.clone(),
                    accepted: false,
                    message: error.to_string(),
                }),
            }
        }
        Ok(confirmations)
    }

    /// Get relay by URL.
    pub async fn relay(&self, url: &str) -> Option<Arc<RelayConnection>> {
        self.relays.read().await.get(url).cloned()
    }

    async fn snapshot(&self) -> Vec<Arc<RelayConnection>> {
        self.relays.read().await.values().cloned().collect()
    }

    fn close_everywhere(relays: &RelayMap, subscription_id: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime to close subscription {}", subscription_id);
            return;
        };
        let relays = Arc::clone(relays);
        runtime.spawn(async move {
            let relays: Vec<Arc<RelayConnection>> =
                relays.read().await.values().cloned().collect();
            for relay in relays {
                if let Err(error) = relay.unsubscribe(&subscription_id).await {
                    debug!("CLOSE {} on {} failed: {}", subscription_id, relay.url(), error);
                }
            }
        });
    }
}

#[async_trait]
impl MessageBus for RelayPool {
    async fn publish(&self, event: &Event) -> Result<String> {
        let confirmations = self.publish_all(event).await?;
        if confirmations.iter().any(|confirmation| confirmation.accepted) {
            return Ok(event.id.clone());
        }

        let reasons = confirmations
            .iter()
            .map(|confirmation| format!("{}: {}", confirmation.relay_url, confirmation.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ClientError::Rejected(reasons))
    }

    async fn subscribe(&self, filter: Filter) -> Result<SubscriptionStream> {
        let relays = self.snapshot().await;
        if relays.is_empty() {
            return Err(ClientError::NotConnected);
        }

        let subscription_id = uuid::Uuid::new_v4().simple().to_string();
        let (subscription, receiver) = Subscription::with_channel(subscription_id.clone(), filter);

        let mut registered = 0usize;
        for relay in relays {
            match relay.subscribe(subscription.clone()).await {
                Ok(()) => registered += 1,
                Err(error) => warn!("subscribe on {} failed: {}", relay.url(), error),
            }
        }
        if registered == 0 {
            return Err(ClientError::Subscription(format!(
                "no relay accepted subscription {}",
                subscription_id
            )));
        }

        let relays = Arc::clone(&self.relays);
        let closing_id = subscription_id.clone();
        Ok(SubscriptionStream::new(subscription_id, receiver, move || {
            RelayPool::close_everywhere(&relays, closing_id);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_pool_is_not_connected() {
        let pool = RelayPool::new(PoolConfig::default());
        assert!(matches!(
            pool.subscribe(Filter::new()).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn relay_limit_is_enforced() -> Result<()> {
        let pool = RelayPool::new(PoolConfig {
            max_relays: 1,
            relay_config: RelayConfig::default(),
        });
        pool.add_relay("wss://one.test").await?;
        pool.add_relay("wss://one.test").await?;
        assert!(matches!(
            pool.add_relay("wss://two.test").await,
            Err(ClientError::Internal(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn publishing_through_disconnected_relays_is_rejected() -> Result<()> {
        let pool = RelayPool::new(PoolConfig::default());
        pool.add_relay("wss://one.test").await?;
        let event = Event {
            id: "id".to_string(),
            pubkey: "pk".to_string(),
            created_at: 1,
            kind: 25910,
            tags: vec![],
            content: String::new(),
            sig: String::new(),
        };

        let result = MessageBus::publish(&pool, &event).await;
        assert!(matches!(result, Err(ClientError::Rejected(reason)) if reason.contains("one.test")));
        Ok(())
    }
}
