//! Nostr transport for protocol clients.
//!
//! This crate intentionally exposes a small surface:
//! - the [`MessageBus`] publish/subscribe seam
//! - relay publish/subscribe over WebSocket with multi-relay fanout
//! - an in-process bus for tests and local runs

pub mod bus;
pub mod error;
pub mod filter;
pub mod memory;
pub mod pool;
pub mod relay;
pub mod subscription;

pub use bus::MessageBus;
pub use error::{ClientError, Result};
pub use filter::Filter;
pub use memory::MemoryBus;
pub use pool::{PoolConfig, RelayPool};
pub use relay::{ConnectionState, PublishConfirmation, RelayConfig, RelayConnection, RelayMessage};
pub use subscription::{StopHandle, Subscription, SubscriptionStream};
