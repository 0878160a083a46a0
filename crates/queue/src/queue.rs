//! The shared queue the source drains.
//!
//! Producers are external and may be many; the source is the only consumer.
//! [`MessageQueue`] is the seam the source is generic over, so tests can plug
//! in their own queue. [`channel`] gives the in-process implementation.

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;

use crate::error::QueueError;
use crate::message::QueueMessage;

/// Single-consumer view of a shared message queue.
#[async_trait]
pub trait MessageQueue: Send {
    /// Remove the head message if one is immediately available.
    fn try_take(&mut self) -> Result<Option<QueueMessage>, QueueError>;

    /// Wait for the next message until `deadline`.
    ///
    /// Returns `Ok(None)` once the deadline passes. Must be cancel safe: a
    /// dropped call must not lose a message.
    async fn take_until(&mut self, deadline: Instant) -> Result<Option<QueueMessage>, QueueError>;
}

/// Create a connected producer/consumer pair.
pub fn channel() -> (QueueProducer, ChannelQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueProducer { tx }, ChannelQueue { rx })
}

/// Cloneable handle that feeds the queue.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::UnboundedSender<QueueMessage>,
}

impl QueueProducer {
    /// Append a message. Fails once the consuming side is gone.
    pub fn push(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.tx.send(message).map_err(|_| QueueError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming side of [`channel`].
///
/// Once every producer is dropped and the buffer is drained, both
/// operations fail with [`QueueError::Closed`].
#[derive(Debug)]
pub struct ChannelQueue {
    rx: mpsc::UnboundedReceiver<QueueMessage>,
}

#[async_trait]
impl MessageQueue for ChannelQueue {
    fn try_take(&mut self) -> Result<Option<QueueMessage>, QueueError> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(QueueError::Closed),
        }
    }

    async fn take_until(&mut self, deadline: Instant) -> Result<Option<QueueMessage>, QueueError> {
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(QueueError::Closed),
            Err(_elapsed) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn msg(body: &str) -> QueueMessage {
        QueueMessage::with_payload("body", body)
    }

    #[tokio::test]
    async fn try_take_preserves_fifo_order() {
        let (producer, mut queue) = channel();
        producer.push(msg("a")).unwrap();
        producer.push(msg("b")).unwrap();

        let first = queue.try_take().unwrap().unwrap();
        let second = queue.try_take().unwrap().unwrap();
        assert_eq!(first.fields["body"], "a");
        assert_eq!(second.fields["body"], "b");
        assert!(queue.try_take().unwrap().is_none());
    }

    #[tokio::test]
    async fn take_until_returns_none_at_deadline() {
        let (_producer, mut queue) = channel();
        let started = Instant::now();
        let got = queue
            .take_until(started + Duration::from_millis(30))
            .await
            .unwrap();
        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn take_until_wakes_on_late_message() {
        let (producer, mut queue) = channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(msg("late")).unwrap();
            // keep the producer alive past the receive
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let started = Instant::now();
        let got = queue
            .take_until(started + Duration::from_secs(5))
            .await
            .unwrap()
            .expect("message before deadline");
        assert_eq!(got.fields["body"], "late");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn dropped_producers_close_after_drain() {
        let (producer, mut queue) = channel();
        producer.push(msg("last")).unwrap();
        drop(producer);

        assert!(queue.try_take().unwrap().is_some());
        assert!(matches!(queue.try_take(), Err(QueueError::Closed)));
        let deadline = Instant::now() + Duration::from_millis(10);
        assert!(matches!(queue.take_until(deadline).await, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn push_fails_without_consumer() {
        let (producer, queue) = channel();
        drop(queue);
        assert!(producer.is_closed());
        assert!(matches!(producer.push(msg("x")), Err(QueueError::Closed)));
    }
}
