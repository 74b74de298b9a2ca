//! NATS Transport
//!
//! Binds the relay to a NATS server. Outbound messages go through one
//! channel drained by a single tokio task, so a node's writes reach the
//! server in the order they were made. Subscriptions are opened up front
//! with [`NatsTransport::subscribe_ready`] so a failure surfaces at startup.
//! Reconnection and delivery guarantees are left to `async-nats`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::relay::{MessageHandler, Transport};

type Outbound = (String, Vec<u8>);

/// [`Transport`] over an `async-nats` client.
#[derive(Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
    runtime: Handle,
    outbound: mpsc::UnboundedSender<Outbound>,
    ready: Arc<Mutex<HashMap<String, async_nats::Subscriber>>>,
}

impl NatsTransport {
    /// Connects to `url` and starts the publish pump. Must be called from
    /// within a tokio runtime, which then runs every transport task.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| TransportError(format!("Unable to connect to nats at {}: {}", url, e)))?;
        info!("Connected to nats at {}", url);

        let (outbound, receiver) = mpsc::unbounded_channel();
        let runtime = Handle::current();
        runtime.spawn(publish_pump(client.clone(), receiver));

        Ok(Self {
            client,
            runtime,
            outbound,
            ready: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Opens the server-side subscription for `subject`.
    ///
    /// [`Transport::subscribe`] only attaches a handler to a subscription
    /// opened here.
    pub async fn subscribe_ready(&self, subject: &str) -> Result<(), TransportError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| TransportError(format!("Unable to subscribe to '{}': {}", subject, e)))?;
        debug!("Subscribed to '{}'", subject);
        self.ready.lock().insert(subject.to_string(), subscriber);
        Ok(())
    }
}

/// Publishes queued messages one at a time, in queue order.
async fn publish_pump(client: async_nats::Client, receiver: mpsc::UnboundedReceiver<Outbound>) {
    drain_in_order(receiver, move |subject, payload| {
        let client = client.clone();
        async move {
            if let Err(e) = client.publish(subject, payload.into()).await {
                error!("Error publishing cache relay message to nats: {}", e);
                return;
            }
            if let Err(e) = client.flush().await {
                warn!("Error flushing nats connection: {}", e);
            }
        }
    })
    .await;
    debug!("Publish pump stopped");
}

/// Runs `send` for each queued message, finishing one before starting the next.
async fn drain_in_order<F, Fut>(mut receiver: mpsc::UnboundedReceiver<Outbound>, mut send: F)
where
    F: FnMut(String, Vec<u8>) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some((subject, payload)) = receiver.recv().await {
        send(subject, payload).await;
    }
}

impl Transport for NatsTransport {
    fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send((subject.to_string(), payload))
            .map_err(|_| TransportError("nats publish pump has stopped".to_string()))
    }

    fn subscribe(&self, subject: &str, handler: MessageHandler) -> Result<(), TransportError> {
        let mut subscriber = self.ready.lock().remove(subject).ok_or_else(|| {
            TransportError(format!("No open nats subscription for '{}'", subject))
        })?;
        let subject = subject.to_string();
        self.runtime.spawn(async move {
            while let Some(message) = subscriber.next().await {
                handler(&message.payload[..]);
            }
            warn!("Subscription to '{}' ended", subject);
        });
        Ok(())
    }
}

impl std::fmt::Debug for NatsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsTransport")
            .field("ready", &self.ready.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}
