//! Job lifecycle: classify correlated events and drive a job to one outcome.
//!
//! ```text
//! Dispatched ──processing/success──> Dispatched
//!     │
//!     ├──payment-required──> AwaitingPaymentResolution ──paid──> (keep waiting)
//!     │                                 │
//!     │                                 └──declined──> Failed
//!     ├──error feedback / error result / timeout──> Failed
//!     └──result with text──> Succeeded
//! ```

use nostr::Event;
use nostr::dvmcp::{
    JobFeedback, JobStatus, ToolCallResult, is_job_feedback_kind, is_job_result_kind,
};
use nostr_client::SubscriptionStream;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use crate::error::DvmcpError;
use crate::payment::{GateDecision, PaymentGate, invoice_preview, select_invoice};

const GENERIC_FEEDBACK_ERROR: &str = "DVMCP processing error";
const GENERIC_PROTOCOL_ERROR: &str = "DVMCP protocol error";
const GENERIC_EXECUTION_ERROR: &str = "Unknown execution error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Dispatched,
    AwaitingPaymentResolution,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// What the wait loop should do after an event.
#[derive(Debug)]
pub enum Step {
    /// Nothing terminal happened.
    Continue,
    /// Payment is needed before the provider continues.
    Pay { amount: String, feedback: JobFeedback },
    /// The job reached its outcome: the first result text, or the failure.
    Finished(Result<String, DvmcpError>),
}

/// State machine for one job. Only events referencing `job_id` are considered.
pub struct FeedbackInterpreter {
    job_id: String,
    state: JobState,
}

impl FeedbackInterpreter {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Dispatched,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn on_event(&mut self, event: &Event) -> Step {
        if self.state.is_terminal() {
            return Step::Continue;
        }
        if !event.has_tag_value("e", &self.job_id) {
            debug!(job_id = %self.job_id, event_id = %event.id, "ignoring uncorrelated event");
            return Step::Continue;
        }

        if is_job_feedback_kind(event.kind) {
            self.on_feedback(event)
        } else if is_job_result_kind(event.kind) {
            self.on_result(event)
        } else {
            Step::Continue
        }
    }

    fn on_feedback(&mut self, event: &Event) -> Step {
        let feedback = match JobFeedback::from_event(event) {
            Ok(feedback) => feedback,
            Err(error) => {
                debug!(job_id = %self.job_id, %error, "ignoring unreadable feedback");
                return Step::Continue;
            }
        };

        match feedback.status {
            JobStatus::Processing | JobStatus::Partial => {
                info!(job_id = %self.job_id, status = feedback.status.as_str(), "job is being processed");
                Step::Continue
            }
            JobStatus::Success => {
                info!(job_id = %self.job_id, "job completed, waiting for result");
                Step::Continue
            }
            JobStatus::Error => {
                let message = feedback
                    .status_extra
                    .clone()
                    .or_else(|| Some(feedback.content.trim().to_string()).filter(|c| !c.is_empty()))
                    .unwrap_or_else(|| GENERIC_FEEDBACK_ERROR.to_string());
                self.fail(DvmcpError::Execution(message))
            }
            JobStatus::PaymentRequired => match feedback.amount.clone() {
                Some(amount) => {
                    info!(job_id = %self.job_id, amount = %amount, "payment required");
                    self.state = JobState::AwaitingPaymentResolution;
                    Step::Pay { amount, feedback }
                }
                None => self.fail(DvmcpError::PaymentMissingAmount),
            },
        }
    }

    fn on_result(&mut self, event: &Event) -> Step {
        let result = match ToolCallResult::from_event(event) {
            Ok(result) => result,
            Err(error) => return self.fail(DvmcpError::MalformedResult(error.to_string())),
        };

        match &result {
            ToolCallResult::ProtocolError { message } => self.fail(DvmcpError::Protocol(
                message
                    .clone()
                    .unwrap_or_else(|| GENERIC_PROTOCOL_ERROR.to_string()),
            )),
            ToolCallResult::Content { is_error: true, .. } => {
                let text = result
                    .first_text()
                    .filter(|text| !text.is_empty())
                    .unwrap_or(GENERIC_EXECUTION_ERROR);
                self.fail(DvmcpError::Execution(text.to_string()))
            }
            ToolCallResult::Content { .. } => match result.first_text() {
                Some(text) if !text.is_empty() => {
                    self.state = JobState::Succeeded;
                    Step::Finished(Ok(text.to_string()))
                }
                _ => {
                    debug!(job_id = %self.job_id, "result without text, still waiting");
                    Step::Continue
                }
            },
        }
    }

    pub fn on_payment(&mut self, decision: GateDecision) -> Step {
        if self.state.is_terminal() {
            return Step::Continue;
        }
        match decision {
            GateDecision::Paid | GateDecision::AlreadyPaid => Step::Continue,
            GateDecision::Declined { amount, invoice } => {
                self.fail(DvmcpError::PaymentRequired { amount, invoice })
            }
        }
    }

    pub fn on_timeout(&mut self) -> Result<String, DvmcpError> {
        self.state = JobState::Failed;
        Err(DvmcpError::RequestTimeout)
    }

    fn fail(&mut self, error: DvmcpError) -> Step {
        warn!(job_id = %self.job_id, code = error.code(), %error, "job failed");
        self.state = JobState::Failed;
        Step::Finished(Err(error))
    }
}

/// Wait on the correlated stream until the job finishes or `deadline` passes.
///
/// The stream is stopped before returning, whatever the outcome.
pub async fn run_job(
    mut stream: SubscriptionStream,
    mut interpreter: FeedbackInterpreter,
    mut gate: PaymentGate,
    deadline: Instant,
) -> Result<String, DvmcpError> {
    let outcome = loop {
        let event = tokio::select! {
            () = sleep_until(deadline) => break interpreter.on_timeout(),
            event = stream.next() => event,
        };
        let Some(event) = event else {
            break Err(DvmcpError::Transport(
                "response stream closed before the job finished".to_string(),
            ));
        };

        match interpreter.on_event(&event) {
            Step::Continue => {}
            Step::Finished(outcome) => break outcome,
            Step::Pay { amount, feedback } => {
                let decision = match timeout_at(deadline, gate.resolve(&amount, &feedback)).await {
                    Ok(decision) => decision,
                    Err(_) => {
                        // The handler task is detached, not cancelled; it may still settle.
                        let invoice = select_invoice(&feedback);
                        warn!(
                            job_id = %interpreter.job_id(),
                            amount = %amount,
                            invoice = %invoice.as_deref().map(invoice_preview).unwrap_or_default(),
                            "deadline passed while the payment handler was running; \
                             the invoice may still be paid"
                        );
                        break interpreter.on_timeout();
                    }
                };
                if let Step::Finished(outcome) = interpreter.on_payment(decision) {
                    break outcome;
                }
            }
        }
    };

    stream.stop();
    debug!(job_id = %interpreter.job_id(), state = ?interpreter.state(), "job finished");
    outcome
}
