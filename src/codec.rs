//! Serialization Codec
//!
//! Canonical byte encoding for cached values. Values are stored and
//! replicated as their JSON form, which is also what sizes an entry.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Serializes a value into its canonical bytes.
pub fn marshal<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decodes canonical bytes into the caller's expected shape.
///
/// Bytes replicated from another process may not match `T`; that surfaces
/// as `NotSerializable` rather than a panic.
pub fn unmarshal<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}
