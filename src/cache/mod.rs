//! Cache Module
//!
//! Provides namespaced in-memory caching with byte-accounted capacity and
//! least-recently-touched eviction.

mod entry;
mod eviction;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use store::InMemCache;
