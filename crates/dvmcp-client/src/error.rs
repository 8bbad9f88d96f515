use thiserror::Error;

/// Amount and invoice of a payment the caller has to settle manually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDetails {
    /// Amount in sats, as the provider wrote it.
    pub amount: String,
    pub invoice: Option<String>,
}

/// Outcome of a failed DVMCP operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DvmcpError {
    #[error("Discovery timeout: found {announcements} servers but none were compatible")]
    DiscoveryTimeout { announcements: usize },

    #[error("DVMCP request timed out")]
    RequestTimeout,

    #[error("{0}")]
    Protocol(String),

    #[error("{0}")]
    Execution(String),

    #[error("Payment required: {amount} sats. Please pay the invoice and try again.")]
    PaymentRequired {
        amount: String,
        invoice: Option<String>,
    },

    #[error("Payment required but no amount specified")]
    PaymentMissingAmount,

    #[error("Failed to publish DVMCP request: {0}")]
    PublishFailure(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("malformed result: {0}")]
    MalformedResult(String),
}

impl DvmcpError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DiscoveryTimeout { .. } => "discovery_timeout",
            Self::RequestTimeout => "request_timeout",
            Self::Protocol(_) => "protocol_error",
            Self::Execution(_) => "execution_error",
            Self::PaymentRequired { .. } => "payment_required",
            Self::PaymentMissingAmount => "payment_missing_amount",
            Self::PublishFailure(_) => "publish_failure",
            Self::Transport(_) => "transport_error",
            Self::Signing(_) => "signing_error",
            Self::MalformedResult(_) => "malformed_result",
        }
    }

    /// Payment details for a manual-payment path, only for `PaymentRequired`.
    pub fn payment_details(&self) -> Option<PaymentDetails> {
        match self {
            Self::PaymentRequired { amount, invoice } => Some(PaymentDetails {
                amount: amount.clone(),
                invoice: invoice.clone(),
            }),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout | Self::PublishFailure(_) | Self::Transport(_)
        )
    }
}

impl From<nostr::SignerError> for DvmcpError {
    fn from(error: nostr::SignerError) -> Self {
        Self::Signing(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DvmcpError>;
