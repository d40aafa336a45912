use std::sync::Arc;

use {
    async_trait::async_trait,
    secrecy::SecretString,
    tokio::{sync::mpsc, task::JoinHandle},
    tracing::debug,
};

use crate::{error::ChannelError, event::RealtimeEvent};

/// Push transport for a single topic per subscription.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Subscribe to `topic`, authorizing with the session's bearer token.
    async fn subscribe(
        &self,
        topic: &str,
        token: &SecretString,
    ) -> Result<Subscription, ChannelError>;
}

/// Receives events delivered by a subscription.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_event(&self, event: RealtimeEvent);
}

/// A live topic subscription. Dropping it stops the transport task.
pub struct Subscription {
    topic: String,
    events: mpsc::Receiver<RealtimeEvent>,
    reader: Option<JoinHandle<()>>,
}

impl Subscription {
    /// A subscription fed through the returned sender. Adapters hand the
    /// sender to their transport task.
    pub fn channel(topic: impl Into<String>, buffer: usize) -> (mpsc::Sender<RealtimeEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self {
            topic: topic.into(),
            events: rx,
            reader: None,
        })
    }

    /// Attach the transport task so it is aborted with the subscription.
    pub fn with_reader(mut self, reader: JoinHandle<()>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next event, or `None` once the transport has closed.
    pub async fn next(&mut self) -> Option<RealtimeEvent> {
        self.events.recv().await
    }

    pub fn close(mut self) {
        self.abort_reader();
    }

    fn abort_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.abort_reader();
    }
}

/// Deliver every event of `subscription` to `sink`, in arrival order, until
/// the transport closes. Returns the number of events delivered.
pub async fn pump(mut subscription: Subscription, sink: Arc<dyn EventSink>) -> usize {
    let mut delivered = 0;
    while let Some(event) = subscription.next().await {
        sink.on_event(event).await;
        delivered += 1;
    }
    debug!(topic = %subscription.topic(), delivered, "subscription closed");
    delivered
}
