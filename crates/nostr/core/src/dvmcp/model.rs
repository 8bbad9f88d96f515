use super::kinds::{
    KIND_DVMCP_JOB_FEEDBACK, KIND_DVMCP_JOB_REQUEST, KIND_DVMCP_JOB_RESULT, METHOD_TOOLS_CALL,
    is_announcement_kind,
};
use crate::nip01::Event;
use crate::tag_parsing::{collect_tag_values, find_any_tag_value, find_tag, find_tag_value, non_empty_field};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while reading or writing DVMCP messages.
#[derive(Debug, Error)]
pub enum DvmcpMessageError {
    #[error("invalid kind: expected {expected}, got {actual}")]
    InvalidKind { expected: u16, actual: u16 },

    #[error("missing required tag: {0}")]
    MissingTag(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("malformed content: {0}")]
    MalformedContent(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

fn expect_kind(event: &Event, expected: u16) -> Result<(), DvmcpMessageError> {
    if event.kind != expected {
        return Err(DvmcpMessageError::InvalidKind {
            expected,
            actual: event.kind,
        });
    }
    Ok(())
}

/// Job feedback status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    /// Provider requires payment before continuing
    PaymentRequired,
    /// Provider is processing the job
    Processing,
    /// Provider was unable to process the job
    Error,
    /// Provider finished; the result message follows separately
    Success,
    /// Provider partially processed the job
    Partial,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::PaymentRequired => "payment-required",
            JobStatus::Processing => "processing",
            JobStatus::Error => "error",
            JobStatus::Success => "success",
            JobStatus::Partial => "partial",
        }
    }
}

impl FromStr for JobStatus {
    type Err = DvmcpMessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment-required" => Ok(JobStatus::PaymentRequired),
            "processing" => Ok(JobStatus::Processing),
            "error" => Ok(JobStatus::Error),
            "success" => Ok(JobStatus::Success),
            "partial" => Ok(JobStatus::Partial),
            _ => Err(DvmcpMessageError::InvalidStatus(s.to_string())),
        }
    }
}

/// A `tools/call` job request.
///
/// # Examples
///
/// ```
/// use nostr::dvmcp::ToolCallRequest;
/// use serde_json::json;
///
/// let request = ToolCallRequest::new("musicbrainz-search-artist")
///     .with_argument("name", json!("Boards of Canada"))
///     .with_provider("provider_pubkey", "wavefunc-dvmcp-bridge");
///
/// let tags = request.to_tags();
/// assert_eq!(tags[0], vec!["method".to_string(), "tools/call".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    /// Provider pubkey (`p` tag)
    pub provider_pubkey: String,
    /// Service identifier (`s` tag)
    pub server_identifier: String,
}

impl ToolCallRequest {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: Map::new(),
            provider_pubkey: String::new(),
            server_identifier: String::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    pub fn with_provider(
        mut self,
        provider_pubkey: impl Into<String>,
        server_identifier: impl Into<String>,
    ) -> Self {
        self.provider_pubkey = provider_pubkey.into();
        self.server_identifier = server_identifier.into();
        self
    }

    /// JSON body: `{"method":"tools/call","params":{"name":..,"arguments":..}}`.
    pub fn to_content(&self) -> Result<String, DvmcpMessageError> {
        serde_json::to_string(&json!({
            "method": METHOD_TOOLS_CALL,
            "params": {
                "name": self.tool_name,
                "arguments": self.arguments,
            },
        }))
        .map_err(|error| DvmcpMessageError::Serialization(error.to_string()))
    }

    pub fn to_tags(&self) -> Vec<Vec<String>> {
        vec![
            vec!["method".to_string(), METHOD_TOOLS_CALL.to_string()],
            vec!["p".to_string(), self.provider_pubkey.clone()],
            vec!["s".to_string(), self.server_identifier.clone()],
        ]
    }

    /// Parse a request event (provider side).
    pub fn from_event(event: &Event) -> Result<Self, DvmcpMessageError> {
        expect_kind(event, KIND_DVMCP_JOB_REQUEST)?;

        let body: Value = serde_json::from_str(&event.content)
            .map_err(|error| DvmcpMessageError::MalformedContent(error.to_string()))?;
        let params = body
            .get("params")
            .ok_or_else(|| DvmcpMessageError::MalformedContent("missing params".to_string()))?;
        let tool_name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| DvmcpMessageError::MalformedContent("missing tool name".to_string()))?;
        let arguments = params
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            tool_name: tool_name.to_string(),
            arguments,
            provider_pubkey: find_tag_value(&event.tags, "p").unwrap_or_default().to_string(),
            server_identifier: find_tag_value(&event.tags, "s").unwrap_or_default().to_string(),
        })
    }
}

/// Job feedback (kind 21316).
///
/// Status travels as `["status", <status>, <detail>?]` and payment details as
/// `["amount", <amount>, <invoice>?]`. Some providers put the invoice in a separate
/// `bolt11` or `invoice` tag instead; that value is kept in `invoice_annotation`.
///
/// # Examples
///
/// ```
/// use nostr::dvmcp::{JobFeedback, JobStatus};
///
/// let feedback = JobFeedback::new(JobStatus::PaymentRequired, "request_event_id", "customer")
///     .with_amount("10", Some("lnbc100n1...".to_string()));
///
/// assert_eq!(feedback.amount.as_deref(), Some("10"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFeedback {
    pub status: JobStatus,
    /// Extra info about the status
    pub status_extra: Option<String>,
    /// The job request event ID
    pub request_id: String,
    /// Customer's pubkey
    pub customer_pubkey: String,
    pub content: String,
    /// Amount exactly as the provider wrote it (sats)
    pub amount: Option<String>,
    /// Invoice from the `amount` tag
    pub bolt11: Option<String>,
    /// Invoice from a standalone `bolt11`/`invoice` tag
    pub invoice_annotation: Option<String>,
}

impl JobFeedback {
    pub fn new(
        status: JobStatus,
        request_id: impl Into<String>,
        customer_pubkey: impl Into<String>,
    ) -> Self {
        Self {
            status,
            status_extra: None,
            request_id: request_id.into(),
            customer_pubkey: customer_pubkey.into(),
            content: String::new(),
            amount: None,
            bolt11: None,
            invoice_annotation: None,
        }
    }

    pub fn with_status_extra(mut self, extra: impl Into<String>) -> Self {
        self.status_extra = Some(extra.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_amount(mut self, amount: impl Into<String>, bolt11: Option<String>) -> Self {
        self.amount = Some(amount.into());
        self.bolt11 = bolt11;
        self
    }

    pub fn with_invoice_annotation(mut self, invoice: impl Into<String>) -> Self {
        self.invoice_annotation = Some(invoice.into());
        self
    }

    pub fn to_tags(&self) -> Vec<Vec<String>> {
        let mut tags = Vec::new();

        let mut status_tag = vec!["status".to_string(), self.status.as_str().to_string()];
        if let Some(extra) = &self.status_extra {
            status_tag.push(extra.clone());
        }
        tags.push(status_tag);

        tags.push(vec!["e".to_string(), self.request_id.clone()]);
        tags.push(vec!["p".to_string(), self.customer_pubkey.clone()]);

        if let Some(amount) = &self.amount {
            let mut amount_tag = vec!["amount".to_string(), amount.clone()];
            if let Some(bolt11) = &self.bolt11 {
                amount_tag.push(bolt11.clone());
            }
            tags.push(amount_tag);
        }

        if let Some(invoice) = &self.invoice_annotation {
            tags.push(vec!["bolt11".to_string(), invoice.clone()]);
        }

        tags
    }

    pub fn from_event(event: &Event) -> Result<Self, DvmcpMessageError> {
        expect_kind(event, KIND_DVMCP_JOB_FEEDBACK)?;

        let status_tag = find_tag(&event.tags, "status")
            .ok_or_else(|| DvmcpMessageError::MissingTag("status".to_string()))?;
        let status = JobStatus::from_str(&status_tag[1])?;
        let status_extra = non_empty_field(status_tag, 2).map(str::to_owned);

        let (amount, bolt11) = match find_tag(&event.tags, "amount") {
            Some(tag) => (
                non_empty_field(tag, 1).map(str::to_owned),
                non_empty_field(tag, 2).map(str::to_owned),
            ),
            None => (None, None),
        };

        Ok(Self {
            status,
            status_extra,
            request_id: find_tag_value(&event.tags, "e").unwrap_or_default().to_string(),
            customer_pubkey: find_tag_value(&event.tags, "p").unwrap_or_default().to_string(),
            content: event.content.clone(),
            amount,
            bolt11,
            invoice_annotation: find_any_tag_value(&event.tags, &["bolt11", "invoice"])
                .map(str::to_owned),
        })
    }
}

/// One entry of a tool result's `content` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            item_type: Some("text".to_string()),
            text: Some(text.into()),
        }
    }
}

/// Payload of a job result (kind 26910).
///
/// Either `{"content":[{"text":..}],"isError":bool}` or `{"error":{"message":..}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallResult {
    /// Provider-level protocol failure.
    ProtocolError { message: Option<String> },
    /// Tool output; `items` is empty when the provider sent no usable array.
    Content { items: Vec<ContentItem>, is_error: bool },
}

impl ToolCallResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self::Content {
            items: vec![ContentItem::text(text)],
            is_error: false,
        }
    }

    pub fn execution_error(text: impl Into<String>) -> Self {
        Self::Content {
            items: vec![ContentItem::text(text)],
            is_error: true,
        }
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: Some(message.into()),
        }
    }

    /// Text of the first content item, if any.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            Self::Content { items, .. } => items.first().and_then(|item| item.text.as_deref()),
            Self::ProtocolError { .. } => None,
        }
    }

    pub fn from_content(content: &str) -> Result<Self, DvmcpMessageError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|error| DvmcpMessageError::MalformedContent(error.to_string()))?;
        let object = value.as_object().ok_or_else(|| {
            DvmcpMessageError::MalformedContent("result payload is not an object".to_string())
        })?;

        if let Some(error) = object.get("error").filter(|error| !error.is_null()) {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| error.as_str())
                .map(str::to_owned);
            return Ok(Self::ProtocolError { message });
        }

        let items = match object.get("content") {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| {
                    serde_json::from_value::<ContentItem>(entry.clone()).unwrap_or(ContentItem {
                        item_type: None,
                        text: entry.as_str().map(str::to_owned),
                    })
                })
                .collect(),
            _ => Vec::new(),
        };
        let is_error = object
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self::Content { items, is_error })
    }

    pub fn from_event(event: &Event) -> Result<Self, DvmcpMessageError> {
        expect_kind(event, KIND_DVMCP_JOB_RESULT)?;
        Self::from_content(&event.content)
    }

    pub fn to_content(&self) -> Result<String, DvmcpMessageError> {
        let value = match self {
            Self::ProtocolError { message } => json!({ "error": { "message": message } }),
            Self::Content { items, is_error } => json!({ "content": items, "isError": is_error }),
        };
        serde_json::to_string(&value)
            .map_err(|error| DvmcpMessageError::Serialization(error.to_string()))
    }
}

/// A provider's self-announcement (kind 31316/31317).
///
/// Announcement payloads are not strictly schematized across ecosystem versions, so
/// every field is optional and the parsed JSON is kept in `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerAnnouncement {
    pub announcer_pubkey: String,
    pub identifier: Option<String>,
    pub name: Option<String>,
    pub server_id: Option<String>,
    /// `type` or `kind` discriminator
    pub server_type: Option<String>,
    pub capabilities: Option<Value>,
    pub tools: Option<Vec<Value>>,
    /// `d` tag values
    pub d_tags: Vec<String>,
    pub raw: Value,
}

impl ServerAnnouncement {
    pub fn from_event(event: &Event) -> Result<Self, DvmcpMessageError> {
        if !is_announcement_kind(event.kind) {
            return Err(DvmcpMessageError::InvalidKind {
                expected: super::kinds::KIND_DVMCP_SERVER_ANNOUNCEMENT,
                actual: event.kind,
            });
        }

        let raw: Value = serde_json::from_str(&event.content)
            .map_err(|error| DvmcpMessageError::MalformedContent(error.to_string()))?;
        let string_field = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_owned);

        Ok(Self {
            announcer_pubkey: event.pubkey.clone(),
            identifier: string_field("identifier"),
            name: string_field("name"),
            server_id: string_field("serverId"),
            server_type: string_field("type").or_else(|| string_field("kind")),
            capabilities: raw.get("capabilities").filter(|value| !value.is_null()).cloned(),
            tools: raw.get("tools").and_then(Value::as_array).cloned(),
            d_tags: collect_tag_values(&event.tags, "d"),
            raw,
        })
    }

    /// Capabilities normalized to lowercase entries.
    ///
    /// Arrays contribute their string entries; a plain string is split on commas,
    /// semicolons, pipes and whitespace.
    pub fn capability_list(&self) -> Vec<String> {
        match &self.capabilities {
            Some(Value::Array(entries)) => entries
                .iter()
                .filter_map(Value::as_str)
                .map(|entry| entry.trim().to_ascii_lowercase())
                .filter(|entry| !entry.is_empty())
                .collect(),
            Some(Value::String(joined)) => joined
                .split(|c: char| c == ',' || c == ';' || c == '|' || c.is_whitespace())
                .map(|entry| entry.trim().to_ascii_lowercase())
                .filter(|entry| !entry.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Declared tool names: bare strings or objects with a `name`.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .iter()
            .flatten()
            .filter_map(|tool| {
                tool.as_str()
                    .or_else(|| tool.get("name").and_then(Value::as_str))
                    .map(str::to_owned)
            })
            .collect()
    }

    /// The serialized payload, lowercased, for keyword scans.
    pub fn searchable_text(&self) -> String {
        self.raw.to_string().to_ascii_lowercase()
    }
}
