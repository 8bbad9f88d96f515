use std::{env, time::Duration};

use thiserror::Error;

/// Service identifier of the Wavefunc DVMCP bridge.
pub const DEFAULT_SERVER_IDENTIFIER: &str = "wavefunc-dvmcp-bridge";

/// Announcer identity of the Wavefunc DVMCP bridge; also the fallback provider.
pub const DEFAULT_PROVIDER_PUBKEY: &str =
    "f47121cd783802e6d4879e63233b54aff54e6788ea9ef568cec0259cc60fe286";

/// Tool a compatible provider is expected to offer.
pub const MUSIC_RECOGNITION_TOOL: &str = "music-recognition";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DvmcpConfig {
    /// Service identifier targeted by requests and matched during discovery.
    pub server_identifier: String,
    /// Provider used when discovery finds nothing.
    pub fallback_provider_pubkey: String,
    pub discovery_timeout: Duration,
    /// Stored announcements requested when discovery starts.
    pub discovery_limit: usize,
    pub tool_timeout: Duration,
    pub recognition_timeout: Duration,
    /// Count cap on the correlated response subscription.
    pub response_limit: usize,
    /// Distinct invoices a single job may try to pay.
    pub max_payment_attempts: u32,
    pub target_tool: String,
}

impl Default for DvmcpConfig {
    fn default() -> Self {
        Self {
            server_identifier: DEFAULT_SERVER_IDENTIFIER.to_string(),
            fallback_provider_pubkey: DEFAULT_PROVIDER_PUBKEY.to_string(),
            discovery_timeout: Duration::from_secs(10),
            discovery_limit: 10,
            tool_timeout: Duration::from_secs(30),
            recognition_timeout: Duration::from_secs(60),
            response_limit: 5,
            max_payment_attempts: 3,
            target_tool: MUSIC_RECOGNITION_TOOL.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid DVMCP_SERVER_IDENTIFIER: {0}")]
    InvalidServerIdentifier(String),
    #[error("invalid DVMCP_PROVIDER_PUBKEY: {0}")]
    InvalidProviderPubkey(String),
    #[error("invalid DVMCP_DISCOVERY_TIMEOUT_MS: {0}")]
    InvalidDiscoveryTimeoutMs(String),
    #[error("invalid DVMCP_TOOL_TIMEOUT_MS: {0}")]
    InvalidToolTimeoutMs(String),
    #[error("invalid DVMCP_RECOGNITION_TIMEOUT_MS: {0}")]
    InvalidRecognitionTimeoutMs(String),
    #[error("invalid DVMCP_RESPONSE_LIMIT: {0}")]
    InvalidResponseLimit(String),
    #[error("invalid DVMCP_MAX_PAYMENT_ATTEMPTS: {0}")]
    InvalidMaxPaymentAttempts(String),
}

impl DvmcpConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server_identifier = match lookup("DVMCP_SERVER_IDENTIFIER") {
            Some(raw) if raw.trim().is_empty() => {
                return Err(ConfigError::InvalidServerIdentifier(
                    "must not be empty".to_string(),
                ));
            }
            Some(raw) => raw.trim().to_string(),
            None => defaults.server_identifier,
        };

        let fallback_provider_pubkey = match lookup("DVMCP_PROVIDER_PUBKEY") {
            Some(raw) => parse_pubkey(raw.trim())?,
            None => defaults.fallback_provider_pubkey,
        };

        let discovery_timeout = parse_millis(
            &lookup,
            "DVMCP_DISCOVERY_TIMEOUT_MS",
            defaults.discovery_timeout,
            ConfigError::InvalidDiscoveryTimeoutMs,
        )?;
        let tool_timeout = parse_millis(
            &lookup,
            "DVMCP_TOOL_TIMEOUT_MS",
            defaults.tool_timeout,
            ConfigError::InvalidToolTimeoutMs,
        )?;
        let recognition_timeout = parse_millis(
            &lookup,
            "DVMCP_RECOGNITION_TIMEOUT_MS",
            defaults.recognition_timeout,
            ConfigError::InvalidRecognitionTimeoutMs,
        )?;

        let response_limit = parse_with_lookup(
            &lookup,
            "DVMCP_RESPONSE_LIMIT",
            defaults.response_limit,
            |raw| {
                raw.trim()
                    .parse::<usize>()
                    .map_err(|error| ConfigError::InvalidResponseLimit(error.to_string()))
                    .and_then(|value| {
                        if value == 0 {
                            return Err(ConfigError::InvalidResponseLimit(
                                "must be at least 1".to_string(),
                            ));
                        }
                        Ok(value)
                    })
            },
        )?;
        let max_payment_attempts = parse_with_lookup(
            &lookup,
            "DVMCP_MAX_PAYMENT_ATTEMPTS",
            defaults.max_payment_attempts,
            |raw| {
                raw.trim()
                    .parse::<u32>()
                    .map_err(|error| ConfigError::InvalidMaxPaymentAttempts(error.to_string()))
            },
        )?;

        Ok(Self {
            server_identifier,
            fallback_provider_pubkey,
            discovery_timeout,
            discovery_limit: defaults.discovery_limit,
            tool_timeout,
            recognition_timeout,
            response_limit,
            max_payment_attempts,
            target_tool: defaults.target_tool,
        })
    }
}

fn parse_pubkey(raw: &str) -> Result<String, ConfigError> {
    if raw.len() != 64 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::InvalidProviderPubkey(
            "expected 64 hex characters".to_string(),
        ));
    }
    Ok(raw.to_ascii_lowercase())
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
    error: fn(String) -> ConfigError,
) -> Result<Duration, ConfigError> {
    parse_with_lookup(lookup, key, default, |raw| {
        let millis = raw
            .trim()
            .parse::<u64>()
            .map_err(|parse_error| error(parse_error.to_string()))?;
        if millis == 0 {
            return Err(error("must be greater than zero".to_string()));
        }
        Ok(Duration::from_millis(millis))
    })
}

fn parse_with_lookup<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    parser: impl FnOnce(String) -> Result<T, ConfigError>,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => parser(raw),
        None => Ok(default),
    }
}
