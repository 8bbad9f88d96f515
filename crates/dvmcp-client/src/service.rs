use std::sync::Arc;
use std::time::Duration;

use nostr::EventSigner;
use nostr_client::MessageBus;
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{DvmcpConfig, MUSIC_RECOGNITION_TOOL};
use crate::directory::{MatchTarget, ProviderDirectory, SelectedProvider};
use crate::dispatch::JobDispatcher;
use crate::error::{DvmcpError, Result};
use crate::interpreter::{FeedbackInterpreter, run_job};
use crate::payment::{PaymentGate, PaymentHandler};
use crate::recognition::{RecognitionEnvelope, RecognitionResult};
use crate::tools::{SearchQuery, SearchType, extract_search_results, lookup_arguments};

struct ServiceInner {
    config: DvmcpConfig,
    directory: ProviderDirectory,
    dispatcher: JobDispatcher,
    provider: RwLock<Option<SelectedProvider>>,
    /// Held while discovery runs so concurrent callers wait instead of re-discovering.
    discovery: Mutex<()>,
    payment_handler: RwLock<Option<Arc<dyn PaymentHandler>>>,
}

/// Shared DVMCP client handle. Clones share provider selection and payment handler.
#[derive(Clone)]
pub struct DvmcpService {
    inner: Arc<ServiceInner>,
}

impl DvmcpService {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        signer: Arc<dyn EventSigner>,
        config: DvmcpConfig,
    ) -> Self {
        let directory = ProviderDirectory::new(
            Arc::clone(&bus),
            MatchTarget::from_config(&config),
            config.discovery_limit,
        );
        let dispatcher = JobDispatcher::new(bus, signer, config.response_limit);
        Self {
            inner: Arc::new(ServiceInner {
                config,
                directory,
                dispatcher,
                provider: RwLock::new(None),
                discovery: Mutex::new(()),
                payment_handler: RwLock::new(None),
            }),
        }
    }

    pub fn config(&self) -> &DvmcpConfig {
        &self.inner.config
    }

    /// Replace the payment handler. Jobs already running keep the one they started with.
    pub async fn set_payment_handler(&self, handler: Arc<dyn PaymentHandler>) {
        *self.inner.payment_handler.write().await = Some(handler);
    }

    pub async fn clear_payment_handler(&self) {
        *self.inner.payment_handler.write().await = None;
    }

    /// Pin the provider, bypassing discovery. Without `service_id` the current service
    /// id (or the configured one) is kept.
    pub async fn set_provider(&self, provider_id: impl Into<String>, service_id: Option<&str>) {
        let mut provider = self.inner.provider.write().await;
        let service_id = match service_id {
            Some(service_id) => service_id.to_string(),
            None => provider
                .as_ref()
                .map(|current| current.service_id.clone())
                .unwrap_or_else(|| self.inner.config.server_identifier.clone()),
        };
        *provider = Some(SelectedProvider::new(provider_id, service_id));
    }

    pub async fn provider(&self) -> Option<SelectedProvider> {
        self.inner.provider.read().await.clone()
    }

    /// Run discovery now and remember the provider it finds.
    pub async fn discover_providers(&self, timeout: Duration) -> Result<SelectedProvider> {
        let _discovery = self.inner.discovery.lock().await;
        let provider = self.inner.directory.discover(timeout).await?;
        *self.inner.provider.write().await = Some(provider.clone());
        Ok(provider)
    }

    async fn ensure_provider(&self) -> SelectedProvider {
        if let Some(provider) = self.provider().await {
            return provider;
        }

        let _discovery = self.inner.discovery.lock().await;
        if let Some(provider) = self.provider().await {
            debug!("provider resolved by a concurrent discovery");
            return provider;
        }

        let discovered = match self
            .inner
            .directory
            .discover(self.inner.config.discovery_timeout)
            .await
        {
            Ok(provider) => provider,
            Err(error) => {
                warn!(%error, "discovery failed, using the default provider");
                SelectedProvider::new(
                    self.inner.config.fallback_provider_pubkey.clone(),
                    self.inner.config.server_identifier.clone(),
                )
            }
        };

        // `set_provider` does not take the discovery lock; an override made while
        // discovery ran wins over its result.
        let mut slot = self.inner.provider.write().await;
        if let Some(pinned) = slot.as_ref() {
            debug!(provider = %pinned.provider_id, "provider pinned during discovery");
            return pinned.clone();
        }
        *slot = Some(discovered.clone());
        discovered
    }

    async fn run_tool(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<String> {
        let provider = self.ensure_provider().await;
        let handler = self.inner.payment_handler.read().await.clone();

        let dispatched = self
            .inner
            .dispatcher
            .dispatch(&provider, tool_name, arguments, timeout)
            .await?;
        let interpreter = FeedbackInterpreter::new(dispatched.job.job_id.clone());
        let gate = PaymentGate::new(handler, self.inner.config.max_payment_attempts);

        run_job(dispatched.stream, interpreter, gate, dispatched.deadline).await
    }

    /// Call `tool_name` and return its first result text parsed as JSON.
    pub async fn call_tool(&self, tool_name: &str, arguments: Map<String, Value>) -> Result<Value> {
        let text = self
            .run_tool(tool_name, arguments, self.inner.config.tool_timeout)
            .await?;
        serde_json::from_str(&text).map_err(|error| {
            DvmcpError::MalformedResult(format!("{tool_name} result is not JSON: {error}"))
        })
    }

    /// Identify the song at `audio_url`.
    pub async fn recognize_audio(&self, audio_url: &str) -> Result<RecognitionResult> {
        let mut arguments = Map::new();
        arguments.insert("audioUrl".to_string(), json!(audio_url));
        let text = self
            .run_tool(
                MUSIC_RECOGNITION_TOOL,
                arguments,
                self.inner.config.recognition_timeout,
            )
            .await?;

        let result = RecognitionEnvelope::parse(&text)?.into_result()?;
        info!(title = %result.title, artist = %result.artist, "recognized track");
        Ok(result)
    }

    /// Search MusicBrainz or Discogs through the provider.
    pub async fn search(&self, search_type: SearchType, query: &SearchQuery) -> Result<Vec<Value>> {
        let response = self
            .call_tool(search_type.search_tool_name(), query.to_arguments(search_type))
            .await?;
        Ok(extract_search_results(&response, search_type))
    }

    /// Fetch one MusicBrainz entity (by MBID) or Discogs release (by id).
    pub async fn lookup(&self, search_type: SearchType, id: &str) -> Result<Value> {
        self.call_tool(search_type.lookup_tool_name(), lookup_arguments(search_type, id))
            .await
    }
}

