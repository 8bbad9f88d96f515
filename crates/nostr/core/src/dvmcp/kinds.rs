/// DVMCP tool-invocation job request.
pub const KIND_DVMCP_JOB_REQUEST: u16 = 25910;

/// DVMCP job result (final payload or protocol error).
pub const KIND_DVMCP_JOB_RESULT: u16 = 26910;

/// DVMCP job feedback (processing, payment-required, error, success).
pub const KIND_DVMCP_JOB_FEEDBACK: u16 = 21316;

/// Parameterized-replaceable server announcement used for discovery.
pub const KIND_DVMCP_SERVER_ANNOUNCEMENT: u16 = 31316;

/// Parameterized-replaceable tools list published next to an announcement.
pub const KIND_DVMCP_TOOLS_LIST: u16 = 31317;

/// JSON-RPC style method marker carried by tool-call requests.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Check if a kind is a DVMCP job request.
pub fn is_job_request_kind(kind: u16) -> bool {
    kind == KIND_DVMCP_JOB_REQUEST
}

/// Check if a kind is a DVMCP job result.
pub fn is_job_result_kind(kind: u16) -> bool {
    kind == KIND_DVMCP_JOB_RESULT
}

/// Check if a kind is DVMCP job feedback.
pub fn is_job_feedback_kind(kind: u16) -> bool {
    kind == KIND_DVMCP_JOB_FEEDBACK
}

/// Check if a kind can arrive on a job's correlated response stream.
pub fn is_job_response_kind(kind: u16) -> bool {
    is_job_result_kind(kind) || is_job_feedback_kind(kind)
}

/// Check if a kind is an announcement a provider publishes about itself.
pub fn is_announcement_kind(kind: u16) -> bool {
    kind == KIND_DVMCP_SERVER_ANNOUNCEMENT || kind == KIND_DVMCP_TOOLS_LIST
}
