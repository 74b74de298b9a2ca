//! Bus Relay
//!
//! Replication over a pub/sub [`Transport`]. Each node stamps its envelopes
//! with a random node id and ignores envelopes carrying its own id.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info, trace, warn};
use uuid::Uuid;

use crate::error::RelayError;
use crate::models::{CipherBlock, Envelope, ProtocolVersion, ReplicationMessage};
use crate::relay::cipher::{self, KEY_SIZE};
use crate::relay::{ObjectListener, ReplicationRelay, Transport};

// == Relay State ==
/// State shared with the subscription handler.
struct RelayCore {
    /// Process-lifetime identity stamped on outbound envelopes
    node_id: String,
    /// Subject envelopes are published on
    subject: String,
    /// Present when a passphrase is configured
    master_key: Option<[u8; KEY_SIZE]>,
    /// Where inbound writes are delivered
    listener: RwLock<Option<ObjectListener>>,
}

impl RelayCore {
    // == Outbound ==
    fn encode(&self, message: &ReplicationMessage) -> Result<Vec<u8>, RelayError> {
        let plain = serde_json::to_vec(message)?;
        let envelope = match &self.master_key {
            None => Envelope::new(ProtocolVersion::Plain, self.node_id.as_str(), plain),
            Some(master_key) => {
                let block = cipher::seal(&plain, master_key)?;
                Envelope::new(
                    ProtocolVersion::Encrypted,
                    self.node_id.as_str(),
                    serde_json::to_vec(&block)?,
                )
            }
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    // == Inbound ==
    /// Decodes an envelope; `None` for this node's own messages.
    fn decode(&self, payload: &[u8]) -> Result<Option<ReplicationMessage>, RelayError> {
        let envelope: Envelope = serde_json::from_slice(payload)?;
        if envelope.node_id == self.node_id {
            trace!("Received message from my node {}, dropping it", self.node_id);
            return Ok(None);
        }

        let message = match envelope.version()? {
            ProtocolVersion::Plain => serde_json::from_slice(&envelope.message_data)?,
            ProtocolVersion::Encrypted => {
                let master_key = self.master_key.as_ref().ok_or(RelayError::MissingPassphrase)?;
                let block: CipherBlock = serde_json::from_slice(&envelope.message_data)?;
                let plain = cipher::open(&block, master_key)?;
                serde_json::from_slice(&plain)?
            }
        };
        Ok(Some(message))
    }

    fn handle(&self, payload: &[u8]) {
        match self.decode(payload) {
            Ok(Some(message)) => {
                trace!("Received cache sync {} {}", message.namespace, message.key);
                let listener = self.listener.read().clone();
                if let Some(listener) = listener {
                    listener(message);
                }
            }
            Ok(None) => {}
            Err(err) => warn!("Dropping replication message: {}", err),
        }
    }
}

// == Bus Relay ==
/// [`ReplicationRelay`] publishing versioned envelopes on one subject.
///
/// With a non-empty passphrase every envelope is encrypted; without one
/// envelopes go out in plain form.
pub struct BusRelay {
    core: Arc<RelayCore>,
    transport: Arc<dyn Transport>,
}

impl BusRelay {
    // == Constructor ==
    /// Creates a relay and subscribes it to `subject`.
    ///
    /// # Arguments
    /// * `transport` - Bus connection to publish on and subscribe through
    /// * `subject` - Subject shared by every node of the cache
    /// * `passphrase` - Shared secret, empty for plain envelopes
    pub fn new(
        transport: Arc<dyn Transport>,
        subject: impl Into<String>,
        passphrase: &str,
    ) -> Result<Self, RelayError> {
        let master_key = if passphrase.is_empty() {
            None
        } else {
            Some(cipher::derive_master_key(passphrase))
        };
        let core = Arc::new(RelayCore {
            node_id: Uuid::new_v4().to_string(),
            subject: subject.into(),
            master_key,
            listener: RwLock::new(None),
        });

        let handler_core = core.clone();
        transport.subscribe(
            &core.subject,
            Arc::new(move |payload: &[u8]| handler_core.handle(payload)),
        )?;

        info!(
            "Replication relay {} listening on '{}' (encrypted: {})",
            core.node_id,
            core.subject,
            core.master_key.is_some()
        );
        Ok(Self { core, transport })
    }

    /// Identity stamped on this node's envelopes.
    pub fn node_id(&self) -> &str {
        &self.core.node_id
    }

    /// Subject this relay publishes on.
    pub fn subject(&self) -> &str {
        &self.core.subject
    }

    /// Whether outbound envelopes are encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.core.master_key.is_some()
    }
}

impl ReplicationRelay for BusRelay {
    fn replicate(&self, message: ReplicationMessage) {
        let payload = match self.core.encode(&message) {
            Ok(payload) => payload,
            Err(err) => {
                error!(
                    "Unable to encode replication message {}/{}: {}",
                    message.namespace, message.key, err
                );
                return;
            }
        };
        if let Err(err) = self.transport.publish(&self.core.subject, payload) {
            error!("Error publishing replication message: {}", err);
        }
    }

    fn register_listener(&self, listener: ObjectListener) {
        *self.core.listener.write() = Some(listener);
    }
}

impl std::fmt::Debug for BusRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusRelay")
            .field("node_id", &self.core.node_id)
            .field("subject", &self.core.subject)
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}
