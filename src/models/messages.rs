//! Replication wire records
//!
//! Every record travels as a JSON object. Byte fields are carried as
//! standard base64 strings so peers written against the same JSON layout
//! can read them.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

// == Replication Message ==
/// One replicated cache write.
///
/// Carries the value already in its codec form, never the typed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationMessage {
    #[serde(rename = "CacheName")]
    pub namespace: String,
    #[serde(rename = "CacheKey")]
    pub key: String,
    #[serde(rename = "CacheValue", with = "base64_bytes")]
    pub value_bytes: Vec<u8>,
}

impl ReplicationMessage {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>, value_bytes: Vec<u8>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            value_bytes,
        }
    }
}

// == Protocol Version ==
/// Envelope format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// `message_data` is a serialized [`ReplicationMessage`]
    Plain,
    /// `message_data` is a serialized [`CipherBlock`]
    Encrypted,
}

impl ProtocolVersion {
    pub fn as_u8(self) -> u8 {
        match self {
            ProtocolVersion::Plain => 0,
            ProtocolVersion::Encrypted => 1,
        }
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = RelayError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ProtocolVersion::Plain),
            1 => Ok(ProtocolVersion::Encrypted),
            other => Err(RelayError::UnknownProtocolVersion(other)),
        }
    }
}

// == Envelope ==
/// Versioned wrapper published on the bus, tagged with the sending node.
///
/// The version stays a raw integer on the wire so envelopes from newer
/// nodes still decode and can be dropped by version instead of failing
/// to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u8,
    #[serde(rename = "messageData", with = "base64_bytes")]
    pub message_data: Vec<u8>,
    #[serde(rename = "nodeID")]
    pub node_id: String,
}

impl Envelope {
    pub fn new(version: ProtocolVersion, node_id: impl Into<String>, message_data: Vec<u8>) -> Self {
        Self {
            protocol_version: version.as_u8(),
            message_data,
            node_id: node_id.into(),
        }
    }

    /// Decodes the version tag, rejecting values this node does not know.
    pub fn version(&self) -> Result<ProtocolVersion, RelayError> {
        ProtocolVersion::try_from(self.protocol_version)
    }
}

// == Cipher Block ==
/// Payload of an encrypted envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherBlock {
    /// Per-message key encrypted under the master key
    #[serde(rename = "messageKey", with = "base64_bytes")]
    pub wrapped_message_key: Vec<u8>,
    /// Serialized replication message encrypted under the message key
    #[serde(rename = "cipherData", with = "base64_bytes")]
    pub cipher_payload: Vec<u8>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}
