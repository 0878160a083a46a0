//! Downstream batch sink.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SinkError;
use crate::message::Event;

/// Receives every batch the source dispatches.
///
/// The batch arrives in queue order. Returning an error marks the cycle as
/// failed; the batch is not retried.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn process_batch(&self, events: Vec<Event>) -> Result<(), SinkError>;
}

/// Blanket implementation so `Arc<dyn BatchSink>` can be used directly.
#[async_trait]
impl<T: BatchSink + ?Sized> BatchSink for Arc<T> {
    async fn process_batch(&self, events: Vec<Event>) -> Result<(), SinkError> {
        (**self).process_batch(events).await
    }
}

/// Forwards batches into a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<Event>>,
}

impl ChannelSink {
    /// Create a sink and the receiver its batches arrive on.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<Event>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl BatchSink for ChannelSink {
    async fn process_batch(&self, events: Vec<Event>) -> Result<(), SinkError> {
        self.tx
            .send(events)
            .await
            .map_err(|_| SinkError::Rejected("batch receiver dropped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_batches() {
        let (sink, mut rx) = ChannelSink::new(4);
        let sink: Arc<dyn BatchSink> = Arc::new(sink);
        sink.process_batch(vec![Event::with_body("a"), Event::with_body("b")])
            .await
            .unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch, vec![Event::with_body("a"), Event::with_body("b")]);
    }

    #[tokio::test]
    async fn channel_sink_rejects_after_receiver_drop() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);
        let err = sink.process_batch(vec![Event::with_body("x")]).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected(_)));
    }
}
