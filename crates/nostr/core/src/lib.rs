//! Nostr protocol primitives for the DVMCP client.

pub mod dvmcp;
pub mod nip01;
mod signer;
mod tag_parsing;

pub use nip01::{Event, EventTemplate, UnsignedEvent, get_event_hash, unix_now_secs};
pub use signer::{EventSigner, SignerError};
