//! Subscription management for receiving filtered events.
//!
//! A subscription has two halves: [`Subscription`] is the transport-side
//! registration that pushes matching events into a channel, and
//! [`SubscriptionStream`] is what the consumer reads from and stops.

use crate::error::{ClientError, Result};
use crate::filter::Filter;
use nostr::Event;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 1000;

/// Transport-side registration for a subscription.
///
/// Clones share the same channel and de-duplication set, so one subscription
/// fanned out to several relays still delivers each event id once.
#[derive(Clone)]
pub struct Subscription {
    /// Subscription ID.
    pub id: String,
    /// Filter for this subscription.
    pub filter: Filter,
    eose_received: Arc<AtomicBool>,
    seen: Arc<Mutex<HashSet<String>>>,
    event_tx: mpsc::Sender<Event>,
}

impl Subscription {
    /// Create a subscription that delivers events on a bounded channel.
    pub fn with_channel(id: String, filter: Filter) -> (Self, mpsc::Receiver<Event>) {
        let (event_tx, event_rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let subscription = Self {
            id,
            filter,
            eose_received: Arc::new(AtomicBool::new(false)),
            seen: Arc::new(Mutex::new(HashSet::new())),
            event_tx,
        };
        (subscription, event_rx)
    }

    /// Handle a received event. Duplicates (same event id) are dropped.
    pub fn handle_event(&self, event: Event) -> Result<()> {
        {
            let mut seen = self
                .seen
                .lock()
                .map_err(|_| ClientError::Internal("subscription seen-set poisoned".to_string()))?;
            if !seen.insert(event.id.clone()) {
                return Ok(());
            }
        }

        self.event_tx.try_send(event).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => {
                ClientError::Subscription("event channel full - consumer too slow".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                ClientError::Subscription("event channel closed".to_string())
            }
        })
    }

    /// Whether the consumer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.event_tx.is_closed()
    }

    /// Mark EOSE as received.
    pub fn mark_eose(&self) {
        self.eose_received.store(true, Ordering::Relaxed);
    }

    /// Check if EOSE has been received.
    pub fn has_eose(&self) -> bool {
        self.eose_received.load(Ordering::Relaxed)
    }
}

type StopCallback = Box<dyn FnOnce() + Send>;

/// Idempotent stop switch shared by a stream and anyone holding a clone.
#[derive(Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    on_stop: Arc<Mutex<Option<StopCallback>>>,
}

impl StopHandle {
    fn new(on_stop: StopCallback) -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            on_stop: Arc::new(Mutex::new(Some(on_stop))),
        }
    }

    /// Stop the subscription. Returns `true` only for the call that actually stopped it.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        let callback = self.on_stop.lock().ok().and_then(|mut guard| guard.take());
        if let Some(callback) = callback {
            callback();
        }
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Consumer side of a subscription.
///
/// Dropping the stream stops it.
pub struct SubscriptionStream {
    id: String,
    receiver: mpsc::Receiver<Event>,
    stop: StopHandle,
}

impl SubscriptionStream {
    /// Wrap a receiver; `on_stop` runs once, on the first `stop()` or on drop.
    pub fn new(
        id: impl Into<String>,
        receiver: mpsc::Receiver<Event>,
        on_stop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            receiver,
            stop: StopHandle::new(Box::new(on_stop)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next event in delivery order; `None` once stopped or the transport closed.
    pub async fn next(&mut self) -> Option<Event> {
        if self.stop.is_stopped() {
            return None;
        }
        self.receiver.recv().await
    }

    /// Stop receiving. Safe to call any number of times.
    pub fn stop(&mut self) -> bool {
        let stopped = self.stop.stop();
        self.receiver.close();
        stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// A clonable handle that can stop this stream from elsewhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        self.stop.stop();
    }
}
