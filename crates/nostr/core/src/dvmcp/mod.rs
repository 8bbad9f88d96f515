//! DVMCP: Data Vending Machine Context Protocol
//!
//! DVMCP carries MCP-style tool calls over Nostr. A customer publishes a `tools/call`
//! job request addressed to a provider; the provider answers on the same relays with
//! feedback events and finally a result event, both referencing the request id via an
//! `e` tag. Providers advertise themselves with announcement events that clients scan
//! during discovery.
//!
//! Internal module boundaries:
//! - `kinds`: event kind constants + kind classification helpers
//! - `model`: request/result/feedback/announcement data models + tag parsing
//! - `builders`: `EventTemplate` construction helpers
//! - `tests`: protocol coverage
//!
//! ## Protocol Overview
//!
//! ```text
//! Customer                         Provider
//!    │                                │
//!    │<──── Server Announcement ──────│ (kind 31316)
//!    │                                │
//!    │───── Job Request ─────────────>│ (kind 25910, tools/call)
//!    │                                │
//!    │<──── Job Feedback ─────────────│ (kind 21316, processing / payment-required)
//!    │                                │
//!    │───── Lightning payment ───────>│ (out of band)
//!    │                                │
//!    │<──── Job Result ───────────────│ (kind 26910)
//! ```
//!
//! ## Payment Flow
//!
//! 1. Provider sends feedback with `["status","payment-required"]` and
//!    `["amount", <sats>, <bolt11>]`
//! 2. Customer settles the invoice out of band
//! 3. Provider continues and publishes the result on the same correlation id

mod builders;
mod kinds;
mod model;

pub use builders::{
    create_job_feedback_event, create_job_result_event, create_server_announcement_event,
    create_tool_call_event,
};
pub use kinds::{
    KIND_DVMCP_JOB_FEEDBACK, KIND_DVMCP_JOB_REQUEST, KIND_DVMCP_JOB_RESULT,
    KIND_DVMCP_SERVER_ANNOUNCEMENT, KIND_DVMCP_TOOLS_LIST, METHOD_TOOLS_CALL,
    is_announcement_kind, is_job_feedback_kind, is_job_request_kind, is_job_response_kind,
    is_job_result_kind,
};
pub use model::{
    ContentItem, DvmcpMessageError, JobFeedback, JobStatus, ServerAnnouncement, ToolCallRequest,
    ToolCallResult,
};
