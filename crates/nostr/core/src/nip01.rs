//! NIP-01: basic event model.
//!
//! Only the parts the DVMCP client needs are modelled here: the signed [`Event`], the
//! [`EventTemplate`] handed to a signer, and the canonical event hash that becomes an
//! event's id.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// A signed Nostr event as it travels over the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// First tag named `name`, including the name itself.
    pub fn tag(&self, name: &str) -> Option<&[String]> {
        crate::tag_parsing::find_tag(&self.tags, name)
    }

    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        crate::tag_parsing::find_tag_value(&self.tags, name)
    }

    /// Whether any `name` tag carries `value`, e.g. one of several `e` references.
    pub fn has_tag_value(&self, name: &str, value: &str) -> bool {
        crate::tag_parsing::has_tag_value(&self.tags, name, value)
    }
}

/// An event that has not been signed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl EventTemplate {
    /// Bind the template to an author, producing the unsigned event that gets hashed.
    pub fn into_unsigned(self, pubkey: impl Into<String>) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: pubkey.into(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
        }
    }
}

/// An event with an author but without id/signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// Compute the NIP-01 event id: sha256 over `[0, pubkey, created_at, kind, tags, content]`.
pub fn get_event_hash(event: &UnsignedEvent) -> Result<String, serde_json::Error> {
    let serialized = serde_json::to_string(&serde_json::json!([
        0,
        event.pubkey,
        event.created_at,
        event.kind,
        event.tags,
        event.content,
    ]))?;
    Ok(hex::encode(Sha256::digest(serialized.as_bytes())))
}

/// Seconds since the unix epoch, `None` if the system clock is before it.
pub fn unix_now_secs() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|elapsed| elapsed.as_secs())
}
