//! Wire records and HTTP DTOs
//!
//! `messages` holds the replication envelope layout shared with peers;
//! `requests`/`responses` are the HTTP bodies of the node binary.

pub mod messages;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use messages::{CipherBlock, Envelope, ProtocolVersion, ReplicationMessage};
pub use requests::{EntryPath, MAX_NAME_LENGTH};
pub use responses::{GetResponse, HealthResponse, PutResponse, StatsResponse};
