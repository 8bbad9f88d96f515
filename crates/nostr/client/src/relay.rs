//! Single relay connection management.

use crate::error::{ClientError, Result};
use crate::subscription::Subscription;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use nostr::Event;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type PendingAcks = Arc<Mutex<HashMap<String, oneshot::Sender<(bool, String)>>>>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Relay message received from a relay.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    Event(String, Event),
    Ok(String, bool, String),
    Eose(String),
    Closed(String, String),
    Notice(String),
    Auth(String),
}

/// Publish confirmation from a relay.
#[derive(Debug, Clone)]
pub struct PublishConfirmation {
    pub relay_url: String,
    pub event_id: String,
    pub accepted: bool,
    pub message: String,
}

/// Relay connection configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub connect_timeout: Duration,
    /// How long to wait for the relay's `OK` after publishing.
    pub publish_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

/// Relay connection.
pub struct RelayConnection {
    url: Url,
    config: RelayConfig,
    state: Arc<RwLock<ConnectionState>>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
    pending_acks: PendingAcks,
    recv_task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl RelayConnection {
    /// Create a new relay connection with default config.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, RelayConfig::default())
    }

    /// Create a new relay connection with custom config.
    pub fn with_config(url: &str, config: RelayConfig) -> Result<Self> {
        let parsed_url = Url::parse(url)?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed_url.scheme()
            )));
        }

        Ok(Self {
            url: parsed_url,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            writer: Arc::new(Mutex::new(None)),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            pending_acks: Arc::new(Mutex::new(HashMap::new())),
            recv_task: Arc::new(Mutex::new(None)),
        })
    }

    /// Relay URL as string.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Connect to relay and start background receive loop.
    pub async fn connect(&self) -> Result<()> {
        let mut state_guard = self.state.write().await;
        if *state_guard == ConnectionState::Connected {
            return Err(ClientError::AlreadyConnected);
        }
        *state_guard = ConnectionState::Connecting;
        drop(state_guard);

        let connect_result = timeout(
            self.config.connect_timeout,
            connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| {
            ClientError::Timeout(format!(
                "connection timeout after {:?}",
                self.config.connect_timeout
            ))
        })?
        .map_err(|error| ClientError::WebSocket(error.to_string()))?;

        let (stream, _response) = connect_result;
        let (writer, mut reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        *self.state.write().await = ConnectionState::Connected;

        let subscriptions = Arc::clone(&self.subscriptions);
        let pending_acks = Arc::clone(&self.pending_acks);
        let state = Arc::clone(&self.state);
        let relay_url = self.url.to_string();

        let task = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match parse_relay_message(text.as_str()) {
                        Ok(Some(message)) => {
                            dispatch_inbound(&relay_url, message, &subscriptions, &pending_acks)
                                .await;
                        }
                        Ok(None) => {}
                        Err(error) => {
                            warn!("protocol parse error on {}: {}", relay_url, error);
                        }
                    },
                    Ok(Message::Ping(payload)) => {
                        debug!("received ping from {} ({} bytes)", relay_url, payload.len());
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!("websocket read error on {}: {}", relay_url, error);
                        break;
                    }
                }
            }

            pending_acks.lock().await.clear();
            *state.write().await = ConnectionState::Disconnected;
        });

        *self.recv_task.lock().await = Some(task);
        Ok(())
    }

    /// Disconnect from relay and stop background tasks.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer
                .send(Message::Close(None))
                .await
                .map_err(|error| ClientError::WebSocket(error.to_string()))?;
        }

        if let Some(task) = self.recv_task.lock().await.take() {
            task.abort();
        }

        *self.state.write().await = ConnectionState::Disconnected;
        Ok(())
    }

    /// Publish event to relay and wait for its `OK`.
    pub async fn publish(&self, event: &Event) -> Result<PublishConfirmation> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending_acks
            .lock()
            .await
            .insert(event.id.clone(), ack_tx);

        if let Err(error) = self.send_json(&json!(["EVENT", event])).await {
            self.pending_acks.lock().await.remove(&event.id);
            return Err(error);
        }

        let outcome = timeout(self.config.publish_timeout, ack_rx).await;
        self.pending_acks.lock().await.remove(&event.id);
        let (accepted, message) = match outcome {
            Ok(Ok(ack)) => ack,
            Ok(Err(_)) => {
                return Err(ClientError::Connection(format!(
                    "{} closed before acknowledging {}",
                    self.url, event.id
                )));
            }
            Err(_) => {
                return Err(ClientError::Timeout(format!(
                    "no OK from {} within {:?}",
                    self.url, self.config.publish_timeout
                )));
            }
        };

        Ok(PublishConfirmation {
            relay_url: self.url.to_string(),
            event_id: event.id.clone(),
            accepted,
            message,
        })
    }

    /// Register and send subscription request.
    pub async fn subscribe(&self, subscription: Subscription) -> Result<()> {
        self.subscriptions
            .lock()
            .await
            .insert(subscription.id.clone(), subscription.clone());
        let sent = self
            .send_json(&json!(["REQ", subscription.id, subscription.filter.to_json()]))
            .await;
        if sent.is_err() {
            self.subscriptions.lock().await.remove(&subscription.id);
        }
        sent
    }

    /// Close subscription on relay.
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        self.subscriptions.lock().await.remove(subscription_id);
        self.send_json(&json!(["CLOSE", subscription_id])).await
    }

    async fn send_json(&self, value: &Value) -> Result<()> {
        if self.state().await != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let text = serde_json::to_string(value)?;
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| ClientError::WebSocket(error.to_string()))
    }
}

async fn dispatch_inbound(
    relay_url: &str,
    message: RelayMessage,
    subscriptions: &Mutex<HashMap<String, Subscription>>,
    pending_acks: &PendingAcks,
) {
    match message {
        RelayMessage::Event(subscription_id, event) => {
            let subscription = { subscriptions.lock().await.get(&subscription_id).cloned() };
            let Some(subscription) = subscription else {
                debug!("event for unknown subscription {} on {}", subscription_id, relay_url);
                return;
            };
            if !subscription.filter.matches(&event) {
                return;
            }
            if let Err(error) = subscription.handle_event(event) {
                warn!("subscription delivery error on {}: {}", relay_url, error);
            }
        }
        RelayMessage::Ok(event_id, accepted, text) => {
            if let Some(ack) = pending_acks.lock().await.remove(&event_id) {
                let _ = ack.send((accepted, text));
            }
        }
        RelayMessage::Eose(subscription_id) => {
            if let Some(subscription) = subscriptions.lock().await.get(&subscription_id) {
                subscription.mark_eose();
            }
        }
        RelayMessage::Closed(subscription_id, reason) => {
            warn!("{} closed subscription {}: {}", relay_url, subscription_id, reason);
            subscriptions.lock().await.remove(&subscription_id);
        }
        RelayMessage::Notice(text) => debug!("notice from {}: {}", relay_url, text),
        RelayMessage::Auth(_) => debug!("{} requested AUTH; not supported", relay_url),
    }
}

fn string_field(array: &[Value], index: usize, what: &str) -> Result<String> {
    array
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ClientError::Protocol(format!("invalid {what}")))
}

/// Parse relay protocol JSON text message into typed relay message.
pub fn parse_relay_message(text: &str) -> Result<Option<RelayMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let array = value
        .as_array()
        .ok_or_else(|| ClientError::Protocol("expected JSON array relay message".to_string()))?;
    let Some(kind) = array.first() else {
        return Ok(None);
    };
    let kind = kind
        .as_str()
        .ok_or_else(|| ClientError::Protocol("missing relay message kind".to_string()))?;

    let require_len = |len: usize| -> Result<()> {
        if array.len() < len {
            return Err(ClientError::Protocol(format!("invalid {kind} message")));
        }
        Ok(())
    };

    match kind {
        "EVENT" => {
            require_len(3)?;
            let subscription_id = string_field(array, 1, "EVENT subscription id")?;
            let event: Event = serde_json::from_value(array[2].clone()).map_err(|error| {
                ClientError::Protocol(format!("invalid EVENT payload: {}", error))
            })?;
            Ok(Some(RelayMessage::Event(subscription_id, event)))
        }
        "OK" => {
            require_len(4)?;
            let event_id = string_field(array, 1, "OK event id")?;
            let accepted = array[2]
                .as_bool()
                .ok_or_else(|| ClientError::Protocol("invalid OK accepted flag".to_string()))?;
            let message = string_field(array, 3, "OK message text")?;
            Ok(Some(RelayMessage::Ok(event_id, accepted, message)))
        }
        "EOSE" => {
            require_len(2)?;
            Ok(Some(RelayMessage::Eose(string_field(
                array,
                1,
                "EOSE subscription id",
            )?)))
        }
        "CLOSED" => {
            require_len(2)?;
            let subscription_id = string_field(array, 1, "CLOSED subscription id")?;
            let reason = array
                .get(2)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(Some(RelayMessage::Closed(subscription_id, reason)))
        }
        "NOTICE" => {
            require_len(2)?;
            Ok(Some(RelayMessage::Notice(string_field(
                array,
                1,
                "NOTICE message text",
            )?)))
        }
        "AUTH" => {
            require_len(2)?;
            Ok(Some(RelayMessage::Auth(string_field(
                array,
                1,
                "AUTH challenge",
            )?)))
        }
        _ => Ok(None),
    }
}
