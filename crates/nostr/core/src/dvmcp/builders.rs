use super::kinds::{
    KIND_DVMCP_JOB_FEEDBACK, KIND_DVMCP_JOB_REQUEST, KIND_DVMCP_JOB_RESULT,
    KIND_DVMCP_SERVER_ANNOUNCEMENT,
};
use super::{DvmcpMessageError, JobFeedback, ToolCallRequest, ToolCallResult};
use crate::nip01::EventTemplate;
use serde_json::Value;

fn event_timestamp_now() -> u64 {
    crate::nip01::unix_now_secs().unwrap_or(0)
}

/// Create an EventTemplate for a `tools/call` job request.
///
/// # Example
///
/// ```
/// use nostr::dvmcp::{ToolCallRequest, create_tool_call_event, KIND_DVMCP_JOB_REQUEST};
///
/// # fn example() -> Result<(), nostr::dvmcp::DvmcpMessageError> {
/// let request = ToolCallRequest::new("music-recognition")
///     .with_argument("audioUrl", serde_json::json!("https://example.com/clip.mp3"));
///
/// let template = create_tool_call_event(&request)?;
/// assert_eq!(template.kind, KIND_DVMCP_JOB_REQUEST);
/// # Ok(())
/// # }
/// ```
pub fn create_tool_call_event(request: &ToolCallRequest) -> Result<EventTemplate, DvmcpMessageError> {
    Ok(EventTemplate {
        kind: KIND_DVMCP_JOB_REQUEST,
        tags: request.to_tags(),
        content: request.to_content()?,
        created_at: event_timestamp_now(),
    })
}

/// Create an EventTemplate for job feedback.
pub fn create_job_feedback_event(feedback: &JobFeedback) -> EventTemplate {
    EventTemplate {
        kind: KIND_DVMCP_JOB_FEEDBACK,
        tags: feedback.to_tags(),
        content: feedback.content.clone(),
        created_at: event_timestamp_now(),
    }
}

/// Create an EventTemplate for a job result referencing `request_id`.
pub fn create_job_result_event(
    request_id: &str,
    customer_pubkey: &str,
    result: &ToolCallResult,
) -> Result<EventTemplate, DvmcpMessageError> {
    Ok(EventTemplate {
        kind: KIND_DVMCP_JOB_RESULT,
        tags: vec![
            vec!["e".to_string(), request_id.to_string()],
            vec!["p".to_string(), customer_pubkey.to_string()],
        ],
        content: result.to_content()?,
        created_at: event_timestamp_now(),
    })
}

/// Create an EventTemplate for a server announcement with the given JSON payload.
pub fn create_server_announcement_event(
    d_tag: &str,
    payload: &Value,
) -> Result<EventTemplate, DvmcpMessageError> {
    Ok(EventTemplate {
        kind: KIND_DVMCP_SERVER_ANNOUNCEMENT,
        tags: vec![vec!["d".to_string(), d_tag.to_string()]],
        content: serde_json::to_string(payload)
            .map_err(|error| DvmcpMessageError::Serialization(error.to_string()))?,
        created_at: event_timestamp_now(),
    })
}
