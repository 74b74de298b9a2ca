//! Replication Relay Module
//!
//! Fans local cache writes out to other nodes and hands their writes back.
//!
//! # Components
//! - [`ReplicationRelay`]: the capability the cache depends on
//! - [`BusRelay`]: envelope protocol over a [`Transport`]
//! - [`NoopRelay`]: stand-in for caches that do not replicate
//! - [`cipher`]: envelope encryption used when a passphrase is set

pub mod bus;
pub mod cipher;
#[cfg(feature = "nats")]
pub mod nats;
pub mod transport;

use std::sync::Arc;

use crate::models::ReplicationMessage;

pub use bus::BusRelay;
#[cfg(feature = "nats")]
pub use nats::NatsTransport;
pub use transport::{InMemoryBus, MessageHandler, Transport};

/// Callback receiving writes replicated from other nodes.
pub type ObjectListener = Arc<dyn Fn(ReplicationMessage) + Send + Sync>;

// == Replication Relay ==
/// Outbound fan-out plus a single inbound listener.
pub trait ReplicationRelay: Send + Sync {
    /// Sends a local write to other nodes. Fire-and-forget: failures are
    /// logged by the relay and never reported back.
    fn replicate(&self, message: ReplicationMessage);

    /// Sets the callback for inbound writes. Last registration wins.
    fn register_listener(&self, listener: ObjectListener);
}

// == No-op Relay ==
/// Relay for standalone caches; drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRelay;

impl ReplicationRelay for NoopRelay {
    fn replicate(&self, _message: ReplicationMessage) {}

    fn register_listener(&self, _listener: ObjectListener) {}
}
