//! Chatty Cache - A size-bounded in-memory cache that chats its writes
//!
//! Provides a namespaced local cache with byte-accounted LRU eviction whose
//! writes are replicated to other processes over a pub/sub bus, optionally
//! under envelope encryption.

pub mod api;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod relay;

pub use api::AppState;
pub use cache::InMemCache;
pub use config::Config;
pub use error::{CacheError, Result};
pub use relay::{BusRelay, InMemoryBus, NoopRelay, ReplicationRelay, Transport};
