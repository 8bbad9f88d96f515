//! Music recognition payloads returned by the `music-recognition` tool.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DvmcpError;

const GENERIC_RECOGNITION_ERROR: &str = "Music recognition failed";

/// A recognized track. Streaming-service blocks are kept as provider-shaped JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apple_music: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discogs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub musicbrainz: Option<Value>,
}

impl RecognitionResult {
    /// Spotify track URL, when the provider included one.
    pub fn spotify_url(&self) -> Option<&str> {
        self.spotify
            .as_ref()?
            .get("external_urls")?
            .get("spotify")?
            .as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionEnvelopeType {
    AuddResponse,
    MusicRecognitionResult,
    AuddError,
    MusicRecognitionError,
    #[serde(other)]
    Unknown,
}

/// `{ "type": ..., "result"?: ..., "error"?: ..., "error_code"?: ... }`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecognitionEnvelope {
    #[serde(rename = "type")]
    pub envelope_type: RecognitionEnvelopeType,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

impl RecognitionEnvelope {
    pub fn parse(text: &str) -> Result<Self, DvmcpError> {
        serde_json::from_str(text).map_err(|error| {
            DvmcpError::MalformedResult(format!("recognition envelope: {error}"))
        })
    }

    /// Unwrap the envelope into a track or the provider's failure.
    pub fn into_result(self) -> Result<RecognitionResult, DvmcpError> {
        match self.envelope_type {
            RecognitionEnvelopeType::AuddResponse
            | RecognitionEnvelopeType::MusicRecognitionResult => {
                let result = self.result.filter(|result| !result.is_null()).ok_or_else(|| {
                    DvmcpError::MalformedResult("recognition response without result".to_string())
                })?;
                serde_json::from_value(result).map_err(|error| {
                    DvmcpError::MalformedResult(format!("recognition result: {error}"))
                })
            }
            RecognitionEnvelopeType::AuddError | RecognitionEnvelopeType::MusicRecognitionError => {
                let message = self
                    .error
                    .filter(|error| !error.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_RECOGNITION_ERROR.to_string());
                Err(DvmcpError::Execution(message))
            }
            RecognitionEnvelopeType::Unknown => Err(DvmcpError::Protocol(
                "unexpected recognition response type".to_string(),
            )),
        }
    }
}
