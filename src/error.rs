//! Error types for the replicated cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Errors surfaced to callers of the cache API.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Value could not go through the codec (either direction)
    #[error("Value not serializable: {0}")]
    NotSerializable(String),

    /// A single item is larger than the whole cache budget
    #[error("Item of {size} bytes exceeds total cache size of {max} bytes")]
    ExceedsCapacity { size: u64, max: u64 },

    /// Evicting every candidate still would not free enough space
    #[error("Eviction could free only {freed} of {needed} bytes")]
    EvictionInsufficient { needed: u64, freed: u64 },

    /// No entry under the namespace/key pair
    #[error("Key not found: {namespace}/{key}")]
    NotFound { namespace: String, key: String },

    /// Key or cipher input malformed
    #[error("Crypto failure: {0}")]
    CryptoFailure(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// Shorthand for a miss on `namespace/key`.
    pub fn not_found(namespace: &str, key: &str) -> Self {
        CacheError::NotFound {
            namespace: namespace.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::NotSerializable(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound { .. } => StatusCode::NOT_FOUND,
            CacheError::NotSerializable(_) => StatusCode::BAD_REQUEST,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::ExceedsCapacity { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::EvictionInsufficient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::CryptoFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Relay Error Enum ==
/// Failures inside the replication path.
///
/// These never reach `put`/`get` callers; the relay logs and drops them.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Envelope or inner record failed to (de)serialize
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Encryption or decryption failed
    #[error("Cipher error: {0}")]
    Cipher(#[from] CacheError),

    /// The bus refused the publish or subscribe
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Envelope tagged with a version this node does not speak
    #[error("Unknown protocol version {0}")]
    UnknownProtocolVersion(u8),

    /// Encrypted envelope arrived but no passphrase is configured
    #[error("Encrypted message received without a configured passphrase")]
    MissingPassphrase,
}

// == Cipher Error Enum ==
/// Errors from the envelope cipher.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CipherError {
    /// Key has the wrong length for AES
    #[error("Invalid key length: {0} bytes")]
    InvalidKey(usize),

    /// Ciphertext is shorter than one block or not block aligned
    #[error("Malformed ciphertext of {0} bytes")]
    MalformedCiphertext(usize),

    /// Could not read an IV from the system RNG
    #[error("Random source failure: {0}")]
    Randomness(String),
}

impl From<CipherError> for CacheError {
    fn from(err: CipherError) -> Self {
        CacheError::CryptoFailure(err.to_string())
    }
}

// == Transport Error ==
/// Error reported by a bus transport.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct TransportError(pub String);

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let resp = CacheError::not_found("ns", "k").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = CacheError::ExceedsCapacity { size: 10, max: 5 }.into_response();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let resp = CacheError::EvictionInsufficient { needed: 10, freed: 5 }.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_cipher_error_becomes_crypto_failure() {
        let err: CacheError = CipherError::InvalidKey(3).into();
        assert!(matches!(err, CacheError::CryptoFailure(_)));
    }

    #[test]
    fn test_not_found_message() {
        let err = CacheError::not_found("space0", "key1");
        assert_eq!(err.to_string(), "Key not found: space0/key1");
    }
}
