//! Signer capability.
//!
//! Key custody lives outside this crate (local keys, NIP-46 bunkers, browser
//! extensions). Callers inject whatever implements [`EventSigner`].

use async_trait::async_trait;
use thiserror::Error;

use crate::nip01::{Event, EventTemplate};

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signer unavailable: {0}")]
    Unavailable(String),

    #[error("signing rejected: {0}")]
    Rejected(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait EventSigner: Send + Sync {
    /// Hex public key the signer publishes under.
    fn public_key_hex(&self) -> String;

    /// Turn a template into a fully signed event with its id filled in.
    async fn sign_event(&self, template: EventTemplate) -> Result<Event, SignerError>;
}
