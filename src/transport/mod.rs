//! Queue transport: the at-least-once channel between producer and consumer.
//!
//! The broker itself is an external collaborator. [`QueueTransport`] is the
//! narrow surface the pipeline needs from it; [`InMemoryQueue`] implements
//! it over tokio channels and, with the `kafka` feature, `KafkaTransport`
//! implements it over `rdkafka`.

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;

use crate::error::TransportError;

#[cfg(feature = "kafka")]
pub use kafka::KafkaTransport;
pub use memory::InMemoryQueue;

/// Broker position of a delivered message, handed back on acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset of the message itself.
    pub offset: i64,
}

/// A message received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Raw message body.
    pub payload: Vec<u8>,
    /// Content type attached by the publisher, if any.
    pub content_type: Option<String>,
    /// Set by transports that track consumer progress on the broker.
    pub receipt: Option<DeliveryReceipt>,
}

impl Delivery {
    /// Creates a delivery with no broker receipt.
    #[must_use]
    pub fn new(payload: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            payload,
            content_type,
            receipt: None,
        }
    }

    /// Attaches the broker position of this message.
    #[must_use]
    pub fn with_receipt(mut self, receipt: DeliveryReceipt) -> Self {
        self.receipt = Some(receipt);
        self
    }
}

/// Stream of deliveries for one subscription. Ends when the transport
/// closes the queue.
pub type MessageStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

/// Operations the pipeline consumes from a message broker.
pub trait QueueTransport: Send + Sync {
    /// Makes sure the queue exists. Idempotent.
    fn declare_queue(&self, queue: &str)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Discards all pending messages, returning how many were dropped.
    fn purge_queue(&self, queue: &str) -> impl Future<Output = Result<u64, TransportError>> + Send;

    /// Publishes one message onto `queue`.
    fn publish(
        &self,
        queue: &str,
        payload: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribes to `queue`.
    fn subscribe(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<MessageStream, TransportError>> + Send;

    /// Marks `delivery` as fully handled. The consumer calls this only once
    /// the message has reached a terminal outcome, so a crash before the
    /// call leads to redelivery rather than loss.
    fn ack(&self, delivery: &Delivery) -> impl Future<Output = Result<(), TransportError>> + Send;
}
