use std::sync::Arc;
use std::time::Duration;

use nostr::EventSigner;
use nostr::dvmcp::{
    KIND_DVMCP_JOB_FEEDBACK, KIND_DVMCP_JOB_RESULT, ToolCallRequest, create_tool_call_event,
};
use nostr_client::{Filter, MessageBus, SubscriptionStream};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::directory::SelectedProvider;
use crate::error::DvmcpError;

/// A dispatched tool call. `job_id` is the id of the signed request event.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub created_at: u64,
}

/// A job together with its correlated response stream and deadline.
pub struct DispatchedJob {
    pub job: Job,
    pub stream: SubscriptionStream,
    pub deadline: Instant,
}

/// Builds, signs and publishes `tools/call` requests.
#[derive(Clone)]
pub struct JobDispatcher {
    bus: Arc<dyn MessageBus>,
    signer: Arc<dyn EventSigner>,
    response_limit: usize,
}

impl JobDispatcher {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        signer: Arc<dyn EventSigner>,
        response_limit: usize,
    ) -> Self {
        Self {
            bus,
            signer,
            response_limit,
        }
    }

    /// Filter for every feedback/result event referencing `job_id`.
    pub fn response_filter(&self, job_id: &str) -> Filter {
        Filter::new()
            .kinds([KIND_DVMCP_JOB_RESULT, KIND_DVMCP_JOB_FEEDBACK])
            .event_ref(job_id)
            .limit(self.response_limit)
    }

    /// Publish a request to `provider` and open its response subscription.
    ///
    /// The subscription is opened before publishing so a fast provider cannot answer
    /// into the void. If publishing fails the subscription is stopped again.
    pub async fn dispatch(
        &self,
        provider: &SelectedProvider,
        tool_name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<DispatchedJob, DvmcpError> {
        let deadline = Instant::now() + timeout;
        let request = ToolCallRequest::new(tool_name)
            .with_arguments(arguments.clone())
            .with_provider(&provider.provider_id, &provider.service_id);
        let template = create_tool_call_event(&request)
            .map_err(|error| DvmcpError::Signing(error.to_string()))?;
        let created_at = template.created_at;
        let event = self.signer.sign_event(template).await?;
        let job_id = event.id.clone();

        let mut stream = self
            .bus
            .subscribe(self.response_filter(&job_id))
            .await
            .map_err(|error| DvmcpError::Transport(error.to_string()))?;

        if let Err(error) = self.bus.publish(&event).await {
            warn!(job_id = %job_id, tool = tool_name, %error, "failed to publish DVMCP request");
            stream.stop();
            return Err(DvmcpError::PublishFailure(error.to_string()));
        }

        info!(
            job_id = %job_id,
            tool = tool_name,
            provider = %provider.provider_id,
            service = %provider.service_id,
            "dispatched DVMCP request"
        );

        Ok(DispatchedJob {
            job: Job {
                job_id,
                tool_name: tool_name.to_string(),
                arguments,
                created_at,
            },
            stream,
            deadline,
        })
    }
}
