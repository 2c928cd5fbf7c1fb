//! In-process queue transport over unbounded tokio channels.
//!
//! Each declared queue buffers messages until its single subscriber
//! drains them, so publishing before the consumer starts loses nothing.
//! [`InMemoryQueue::close_queue`] ends the subscriber's stream once the
//! backlog is drained.

use std::collections::HashMap;

use futures_util::stream;
use tokio::sync::{Mutex, mpsc};

use super::{Delivery, MessageStream, QueueTransport};
use crate::error::TransportError;

#[derive(Debug)]
struct QueueSlot {
    sender: Option<mpsc::UnboundedSender<Delivery>>,
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
}

impl QueueSlot {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }
}

/// Broker stand-in holding any number of named queues.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, QueueSlot>>,
}

impl InMemoryQueue {
    /// Creates a broker with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops accepting messages on `queue`. The subscriber's stream ends
    /// after the messages already queued have been delivered.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnknownQueue`] if the queue was never
    /// declared.
    pub async fn close_queue(&self, queue: &str) -> Result<(), TransportError> {
        let mut queues = self.queues.lock().await;
        let slot = queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
        slot.sender = None;
        tracing::debug!(queue, "queue closed");
        Ok(())
    }
}

impl QueueTransport for InMemoryQueue {
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        let mut queues = self.queues.lock().await;
        if !queues.contains_key(queue) {
            queues.insert(queue.to_string(), QueueSlot::new());
            tracing::debug!(queue, "queue declared");
        }
        Ok(())
    }

    async fn purge_queue(&self, queue: &str) -> Result<u64, TransportError> {
        let mut queues = self.queues.lock().await;
        let slot = queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
        let receiver = slot
            .receiver
            .as_mut()
            .ok_or_else(|| TransportError::AlreadySubscribed(queue.to_string()))?;
        let mut purged = 0;
        while receiver.try_recv().is_ok() {
            purged += 1;
        }
        Ok(purged)
    }

    async fn publish(
        &self,
        queue: &str,
        payload: Vec<u8>,
        content_type: &str,
    ) -> Result<(), TransportError> {
        let queues = self.queues.lock().await;
        let slot = queues
            .get(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
        let sender = slot
            .sender
            .as_ref()
            .ok_or_else(|| TransportError::Closed(queue.to_string()))?;
        sender
            .send(Delivery::new(payload, Some(content_type.to_string())))
            .map_err(|_| TransportError::Closed(queue.to_string()))
    }

    async fn subscribe(&self, queue: &str) -> Result<MessageStream, TransportError> {
        let mut queues = self.queues.lock().await;
        let slot = queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
        let receiver = slot
            .receiver
            .take()
            .ok_or_else(|| TransportError::AlreadySubscribed(queue.to_string()))?;
        tracing::debug!(queue, "subscribed");
        Ok(Box::pin(stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|delivery| (delivery, rx))
        })))
    }

    /// Messages leave the channel when received; there is nothing to settle.
    async fn ack(&self, _delivery: &Delivery) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    const JSON: &str = "application/json";

    async fn declared(queue: &str) -> InMemoryQueue {
        let broker = InMemoryQueue::new();
        let Ok(()) = broker.declare_queue(queue).await else {
            panic!("declare {queue} failed");
        };
        broker
    }

    async fn publish(broker: &InMemoryQueue, body: &[u8]) {
        let Ok(()) = broker.publish("q", body.to_vec(), JSON).await else {
            panic!("publish failed");
        };
    }

    async fn subscribe(broker: &InMemoryQueue) -> MessageStream {
        let Ok(stream) = broker.subscribe("q").await else {
            panic!("subscribe failed");
        };
        stream
    }

    async fn next(stream: &mut MessageStream) -> Delivery {
        let Some(delivery) = stream.next().await else {
            panic!("stream ended early");
        };
        delivery
    }

    #[tokio::test]
    async fn messages_published_before_subscribe_are_buffered() {
        let broker = declared("q").await;
        publish(&broker, b"one").await;
        publish(&broker, b"two").await;

        let mut stream = subscribe(&broker).await;
        let first = next(&mut stream).await;
        assert_eq!(first.payload, b"one");
        assert_eq!(first.content_type.as_deref(), Some(JSON));
        assert_eq!(first.receipt, None);
        assert_eq!(next(&mut stream).await.payload, b"two");
    }

    #[tokio::test]
    async fn close_ends_stream_after_backlog() {
        let broker = declared("q").await;
        let mut stream = subscribe(&broker).await;
        publish(&broker, b"last").await;
        let Ok(()) = broker.close_queue("q").await else {
            panic!("close failed");
        };

        assert_eq!(next(&mut stream).await.payload, b"last");
        assert!(stream.next().await.is_none());
        assert!(matches!(
            broker.publish("q", b"late".to_vec(), JSON).await,
            Err(TransportError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn declare_is_idempotent_and_keeps_backlog() {
        let broker = declared("q").await;
        publish(&broker, b"kept").await;
        assert!(broker.declare_queue("q").await.is_ok());
        assert!(matches!(broker.purge_queue("q").await, Ok(1)));
    }

    #[tokio::test]
    async fn purge_drops_pending_messages() {
        let broker = declared("q").await;
        for _ in 0..3 {
            publish(&broker, b"stale").await;
        }
        assert!(matches!(broker.purge_queue("q").await, Ok(3)));
        assert!(matches!(broker.purge_queue("q").await, Ok(0)));
    }

    #[tokio::test]
    async fn ack_is_accepted_for_any_delivery() {
        let broker = declared("q").await;
        publish(&broker, b"one").await;
        let mut stream = subscribe(&broker).await;
        let delivery = next(&mut stream).await;
        assert!(broker.ack(&delivery).await.is_ok());
    }

    #[tokio::test]
    async fn undeclared_queue_is_rejected() {
        let broker = InMemoryQueue::new();
        assert!(matches!(
            broker.publish("missing", Vec::new(), JSON).await,
            Err(TransportError::UnknownQueue(_))
        ));
        assert!(broker.subscribe("missing").await.is_err());
    }

    #[tokio::test]
    async fn second_subscriber_is_rejected() {
        let broker = declared("q").await;
        let _stream = subscribe(&broker).await;
        assert!(matches!(
            broker.subscribe("q").await,
            Err(TransportError::AlreadySubscribed(_))
        ));
    }
}
