//! Request DTOs for the cache HTTP API
//!
//! Defines the path parameters addressing a cache entry.

use serde::Deserialize;

/// Maximum allowed namespace or key length in bytes
pub const MAX_NAME_LENGTH: usize = 256;

/// Path parameters for `/cache/:namespace/:key`
#[derive(Debug, Clone, Deserialize)]
pub struct EntryPath {
    /// The cache namespace
    pub namespace: String,
    /// The key within the namespace
    pub key: String,
}

impl EntryPath {
    /// Validates the path segments
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.namespace.is_empty() {
            return Some("Namespace cannot be empty".to_string());
        }
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.namespace.len() > MAX_NAME_LENGTH || self.key.len() > MAX_NAME_LENGTH {
            return Some(format!(
                "Namespace and key are limited to {} characters",
                MAX_NAME_LENGTH
            ));
        }
        None
    }
}
