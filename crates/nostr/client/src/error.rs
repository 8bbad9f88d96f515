//! Transport errors shared by relay connections, the pool and the memory bus.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Every relay refused the event, or the bus was told to refuse it.
    #[error("publish rejected: {0}")]
    Rejected(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    /// No OK arrived within the publish window.
    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A relay frame that is not valid NIP-01.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
