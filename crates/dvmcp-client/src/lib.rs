//! DVMCP tool-call client.
//!
//! Dispatches `tools/call` jobs to DVMCP providers over a [`MessageBus`], follows each
//! job through its feedback/result lifecycle and settles mid-flight payment requests
//! through an injected [`PaymentHandler`].
//!
//! Internal module boundaries:
//! - `config`: defaults and environment overrides
//! - `directory`: provider discovery over announcement events
//! - `dispatch`: request construction, signing, correlated subscription
//! - `interpreter`: per-job state machine and the wait loop
//! - `payment`: payment handler seam, invoice inspection, payment gate
//! - `service`: the shared [`DvmcpService`] handle
//! - `recognition` / `tools`: typed helpers for the music tools providers expose
//!
//! [`MessageBus`]: nostr_client::MessageBus

pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod interpreter;
pub mod payment;
pub mod recognition;
pub mod service;
pub mod tools;

pub use config::{ConfigError, DvmcpConfig};
pub use directory::{ProviderDirectory, SelectedProvider};
pub use dispatch::{DispatchedJob, Job, JobDispatcher};
pub use error::{DvmcpError, PaymentDetails, Result};
pub use interpreter::{FeedbackInterpreter, JobState};
pub use payment::{Bolt11, PaymentHandler, PaymentHandlerError, PaymentRequest, payment_handler_fn};
pub use recognition::{RecognitionEnvelope, RecognitionResult};
pub use service::DvmcpService;
pub use tools::{SearchQuery, SearchType};
