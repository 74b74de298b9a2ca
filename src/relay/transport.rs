//! Bus Transport Module
//!
//! The publish/subscribe seam the relay sits on, and an in-process bus.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::TransportError;

/// Callback invoked with the raw bytes of each message on a subject.
pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

// == Transport ==
/// Minimal pub/sub capability.
///
/// Delivery is best-effort with no acknowledgment; only per-publisher FIFO
/// on a single connection is assumed.
pub trait Transport: Send + Sync {
    /// Publishes `payload` on `subject`.
    fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Invokes `handler` for every message later published on `subject`,
    /// including this process's own.
    fn subscribe(&self, subject: &str, handler: MessageHandler) -> Result<(), TransportError>;
}

// == In-Memory Bus ==
/// Process-local bus.
///
/// Clones share the same subscriptions. Messages are delivered inline on
/// the publishing thread, in subscription order. Messages published before
/// a subscription are not replayed.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    subjects: Arc<RwLock<HashMap<String, Vec<MessageHandler>>>>,
}

impl InMemoryBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers subscribed to `subject`.
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.subjects.read().get(subject).map_or(0, Vec::len)
    }
}

impl Transport for InMemoryBus {
    fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        // Snapshot so handlers may publish or subscribe without deadlocking
        let handlers = self.subjects.read().get(subject).cloned().unwrap_or_default();
        for handler in handlers {
            handler(&payload);
        }
        Ok(())
    }

    fn subscribe(&self, subject: &str, handler: MessageHandler) -> Result<(), TransportError> {
        self.subjects
            .write()
            .entry(subject.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("subjects", &self.subjects.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn collector() -> (Arc<Mutex<Vec<Vec<u8>>>>, MessageHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: MessageHandler = Arc::new(move |bytes: &[u8]| sink.lock().push(bytes.to_vec()));
        (seen, handler)
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = InMemoryBus::new();
        let (first, h1) = collector();
        let (second, h2) = collector();
        bus.subscribe("chatty.replicate", h1).unwrap();
        bus.subscribe("chatty.replicate", h2).unwrap();

        bus.publish("chatty.replicate", b"hello".to_vec()).unwrap();

        assert_eq!(first.lock().as_slice(), &[b"hello".to_vec()]);
        assert_eq!(second.lock().as_slice(), &[b"hello".to_vec()]);
        assert_eq!(bus.subscriber_count("chatty.replicate"), 2);
    }

    #[test]
    fn test_subjects_are_separate() {
        let bus = InMemoryBus::new();
        let (seen, handler) = collector();
        bus.subscribe("a", handler).unwrap();

        bus.publish("b", b"nope".to_vec()).unwrap();

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = InMemoryBus::new();
        assert!(bus.publish("empty", vec![1]).is_ok());
        assert_eq!(bus.subscriber_count("empty"), 0);
    }

    #[test]
    fn test_clones_share_subscriptions() {
        let bus = InMemoryBus::new();
        let other = bus.clone();
        let (seen, handler) = collector();
        bus.subscribe("s", handler).unwrap();

        other.publish("s", vec![7]).unwrap();

        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_preserves_publish_order() {
        let bus = InMemoryBus::new();
        let (seen, handler) = collector();
        bus.subscribe("s", handler).unwrap();

        for i in 0..5u8 {
            bus.publish("s", vec![i]).unwrap();
        }

        let order: Vec<u8> = seen.lock().iter().map(|m| m[0]).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }
}
