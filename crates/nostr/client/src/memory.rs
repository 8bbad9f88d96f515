//! In-process message bus.
//!
//! Behaves like a single relay held in memory: published events are stored and
//! fanned out to live subscriptions, and new subscriptions first replay stored
//! matches. Used by tests and local vignettes.

use crate::bus::MessageBus;
use crate::error::{ClientError, Result};
use crate::filter::Filter;
use crate::subscription::{Subscription, SubscriptionStream};
use async_trait::async_trait;
use nostr::Event;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

#[derive(Default)]
struct MemoryBusState {
    events: Vec<Event>,
    subscriptions: HashMap<String, Subscription>,
    opened_subscriptions: usize,
    reject_publishes: Option<String>,
}

/// In-memory [`MessageBus`].
#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<MemoryBusState>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryBusState>> {
        self.state
            .lock()
            .map_err(|_| ClientError::Internal("memory bus state poisoned".to_string()))
    }

    /// Make every subsequent publish fail with `reason` (`None` restores normal behavior).
    pub fn reject_publishes(&self, reason: Option<&str>) {
        if let Ok(mut state) = self.lock() {
            state.reject_publishes = reason.map(str::to_owned);
        }
    }

    /// Every event published so far, in publish order.
    pub fn published(&self) -> Vec<Event> {
        self.lock()
            .map(|state| state.events.clone())
            .unwrap_or_default()
    }

    /// Number of subscriptions currently open.
    pub fn active_subscriptions(&self) -> usize {
        self.lock()
            .map(|state| state.subscriptions.len())
            .unwrap_or_default()
    }

    /// Number of subscriptions ever opened.
    pub fn opened_subscriptions(&self) -> usize {
        self.lock()
            .map(|state| state.opened_subscriptions)
            .unwrap_or_default()
    }

    fn remove_subscription(state: &Weak<Mutex<MemoryBusState>>, subscription_id: &str) {
        let Some(state) = state.upgrade() else {
            return;
        };
        if let Ok(mut state) = state.lock() {
            state.subscriptions.remove(subscription_id);
        }
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, event: &Event) -> Result<String> {
        let mut state = self.lock()?;
        if let Some(reason) = &state.reject_publishes {
            return Err(ClientError::Rejected(reason.clone()));
        }

        state.events.push(event.clone());
        state.subscriptions.retain(|_, subscription| !subscription.is_closed());
        for subscription in state.subscriptions.values() {
            if !subscription.filter.matches(event) {
                continue;
            }
            if let Err(error) = subscription.handle_event(event.clone()) {
                warn!("memory bus delivery failed on {}: {}", subscription.id, error);
            }
        }

        debug!(event_id = %event.id, kind = event.kind, "memory bus published event");
        Ok(event.id.clone())
    }

    async fn subscribe(&self, filter: Filter) -> Result<SubscriptionStream> {
        let subscription_id = uuid::Uuid::new_v4().simple().to_string();
        let (subscription, receiver) = Subscription::with_channel(subscription_id.clone(), filter);

        {
            let mut state = self.lock()?;
            let stored: Vec<&Event> = state
                .events
                .iter()
                .filter(|event| subscription.filter.matches(event))
                .collect();
            let skip = subscription
                .filter
                .limit
                .map_or(0, |limit| stored.len().saturating_sub(limit));
            for event in stored.into_iter().skip(skip) {
                subscription.handle_event(event.clone())?;
            }
            subscription.mark_eose();

            state.opened_subscriptions += 1;
            state
                .subscriptions
                .insert(subscription_id.clone(), subscription);
        }

        let weak_state = Arc::downgrade(&self.state);
        let closing_id = subscription_id.clone();
        Ok(SubscriptionStream::new(subscription_id, receiver, move || {
            MemoryBus::remove_subscription(&weak_state, &closing_id);
        }))
    }
}
