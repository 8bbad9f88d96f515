//! Payment gate for `payment-required` feedback.
//!
//! The gate never moves money itself. It picks the invoice out of the feedback, hands
//! it to the injected [`PaymentHandler`] and reports whether the job may keep waiting.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use nostr::dvmcp::JobFeedback;
use thiserror::Error;
use tracing::{info, warn};

/// Invoice prefixes accepted as BOLT11 (mainnet, testnet, regtest).
pub const INVOICE_PREFIXES: [&str; 3] = ["lnbc", "lntb", "lnbcrt"];

/// Payment the provider asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    /// Amount in sats, as the provider wrote it.
    pub amount: String,
    pub invoice: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PaymentHandlerError(pub String);

/// Settles invoices on behalf of the client (wallet, NWC connection, ...).
#[async_trait]
pub trait PaymentHandler: Send + Sync {
    /// `Ok(true)` once the invoice is paid; `Ok(false)` or an error when it was not.
    async fn pay(&self, request: &PaymentRequest) -> Result<bool, PaymentHandlerError>;
}

/// [`PaymentHandler`] backed by an async closure.
pub struct FnPaymentHandler<F> {
    pay: F,
}

/// Wrap an async closure as a shareable [`PaymentHandler`].
pub fn payment_handler_fn<F, Fut>(pay: F) -> Arc<dyn PaymentHandler>
where
    F: Fn(PaymentRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, PaymentHandlerError>> + Send + 'static,
{
    Arc::new(FnPaymentHandler { pay })
}

#[async_trait]
impl<F, Fut> PaymentHandler for FnPaymentHandler<F>
where
    F: Fn(PaymentRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, PaymentHandlerError>> + Send,
{
    async fn pay(&self, request: &PaymentRequest) -> Result<bool, PaymentHandlerError> {
        (self.pay)(request.clone()).await
    }
}

/// Minimal BOLT11 inspection.
pub struct Bolt11;

impl Bolt11 {
    /// Whether `invoice` starts with a recognized BOLT11 prefix.
    pub fn has_known_prefix(invoice: &str) -> bool {
        let invoice = invoice.trim().to_ascii_lowercase();
        INVOICE_PREFIXES
            .iter()
            .any(|prefix| invoice.starts_with(prefix))
    }

    /// Parse amount from a BOLT11 invoice and return millisatoshis.
    ///
    /// Returns `None` if the invoice is amountless, malformed, contains an
    /// unsupported multiplier, or overflows 64-bit arithmetic.
    #[must_use]
    pub fn amount_msats(invoice: &str) -> Option<u64> {
        let invoice = invoice.trim().to_ascii_lowercase();
        let hrp_end = invoice.rfind('1')?;
        let hrp = &invoice[..hrp_end];
        let amount_part = ["lnbcrt", "lnbc", "lntb"]
            .iter()
            .find_map(|prefix| hrp.strip_prefix(prefix))?;
        if amount_part.is_empty() {
            return None;
        }

        let (digits, multiplier) = match amount_part.as_bytes().last() {
            Some(unit @ (b'm' | b'u' | b'n' | b'p')) => {
                (&amount_part[..amount_part.len() - 1], Some(*unit))
            }
            _ => (amount_part, None),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let amount = digits.parse::<u64>().ok()?;

        match multiplier {
            Some(b'p') => {
                if amount % 10 != 0 {
                    return None;
                }
                Some(amount / 10)
            }
            Some(b'm') => amount.checked_mul(100_000_000),
            Some(b'u') => amount.checked_mul(100_000),
            Some(b'n') => amount.checked_mul(100),
            None => amount.checked_mul(100_000_000_000),
            _ => None,
        }
    }
}

/// Invoice to pay for a `payment-required` feedback.
///
/// The `amount` tag's invoice wins when it looks like BOLT11; otherwise a standalone
/// `bolt11`/`invoice` tag is used, and failing that whatever the `amount` tag held.
pub fn select_invoice(feedback: &JobFeedback) -> Option<String> {
    let primary = feedback
        .bolt11
        .as_deref()
        .filter(|invoice| !invoice.trim().is_empty());
    if let Some(invoice) = primary.filter(|invoice| Bolt11::has_known_prefix(invoice)) {
        return Some(invoice.to_string());
    }
    feedback
        .invoice_annotation
        .as_deref()
        .filter(|invoice| !invoice.trim().is_empty())
        .or(primary)
        .map(str::to_owned)
}

pub(crate) fn invoice_preview(invoice: &str) -> String {
    let preview: String = invoice.chars().take(20).collect();
    format!("{preview}...")
}

/// What the gate decided for one `payment-required` feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Invoice settled; keep waiting on the same job.
    Paid,
    /// Invoice was already settled earlier in this job; nothing to do.
    AlreadyPaid,
    /// Could not pay; the job fails with these details.
    Declined {
        amount: String,
        invoice: Option<String>,
    },
}

/// Per-job payment state. The handler is captured when the job starts.
pub struct PaymentGate {
    handler: Option<Arc<dyn PaymentHandler>>,
    max_attempts: u32,
    attempts: u32,
    paid_invoices: HashSet<String>,
}

impl PaymentGate {
    pub fn new(handler: Option<Arc<dyn PaymentHandler>>, max_attempts: u32) -> Self {
        Self {
            handler,
            max_attempts,
            attempts: 0,
            paid_invoices: HashSet::new(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Resolve a `payment-required` feedback whose `amount` is known.
    pub async fn resolve(&mut self, amount: &str, feedback: &JobFeedback) -> GateDecision {
        let invoice = select_invoice(feedback);
        let declined = |invoice: Option<String>| GateDecision::Declined {
            amount: amount.to_string(),
            invoice,
        };

        let Some(invoice) = invoice else {
            warn!(amount, "payment required but no invoice provided");
            return declined(None);
        };
        if self.paid_invoices.contains(&invoice) {
            info!(
                invoice = %invoice_preview(&invoice),
                "payment-required repeated for an invoice already paid"
            );
            return GateDecision::AlreadyPaid;
        }
        if self.attempts >= self.max_attempts {
            warn!(
                amount,
                attempts = self.attempts,
                "payment attempts exhausted for job"
            );
            return declined(Some(invoice));
        }
        self.attempts += 1;

        if !Bolt11::has_known_prefix(&invoice) {
            warn!(invoice = %invoice_preview(&invoice), "invoice has an unrecognized prefix");
        } else if let Some(msats) = Bolt11::amount_msats(&invoice) {
            info!(amount, invoice_msats = msats, "invoice amount");
        }

        let Some(handler) = self.handler.clone() else {
            info!(
                amount,
                invoice = %invoice_preview(&invoice),
                "manual payment required"
            );
            return declined(Some(invoice));
        };

        let request = PaymentRequest {
            amount: amount.to_string(),
            invoice: invoice.clone(),
        };
        // A panicking handler surfaces as a JoinError instead of unwinding the job.
        let outcome = tokio::spawn(async move { handler.pay(&request).await }).await;
        match outcome {
            Ok(Ok(true)) => {
                info!(amount, "automatic payment succeeded");
                self.paid_invoices.insert(invoice);
                GateDecision::Paid
            }
            Ok(Ok(false)) => {
                info!(amount, "automatic payment declined, falling back to manual");
                declined(Some(invoice))
            }
            Ok(Err(error)) => {
                warn!(amount, %error, "automatic payment failed");
                declined(Some(invoice))
            }
            Err(error) => {
                warn!(amount, %error, "payment handler aborted");
                declined(Some(invoice))
            }
        }
    }
}
