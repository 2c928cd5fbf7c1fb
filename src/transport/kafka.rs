//! Kafka queue transport built on `rdkafka`.
//!
//! Queues map to topics. The content type travels as a `content-type`
//! message header. Kafka cannot drop a topic's backlog from a client, so
//! purging is a logged no-op; a fresh consumer group starts from the
//! configured offset instead.
//!
//! Offsets are stored only through [`QueueTransport::ack`]. The periodic
//! auto-commit therefore never covers a message whose outcome has not been
//! reached, and a restart redelivers anything in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::{RwLock, mpsc};

use super::{Delivery, DeliveryReceipt, MessageStream, QueueTransport};
use crate::error::TransportError;

const CONTENT_TYPE_HEADER: &str = "content-type";
const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const PREFETCH: usize = 256;

/// Queue transport backed by a Kafka cluster.
pub struct KafkaTransport {
    brokers: String,
    group_id: String,
    producer: FutureProducer,
    consumers: RwLock<HashMap<String, Arc<StreamConsumer>>>,
}

impl std::fmt::Debug for KafkaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaTransport")
            .field("brokers", &self.brokers)
            .field("group_id", &self.group_id)
            .finish_non_exhaustive()
    }
}

impl KafkaTransport {
    /// Creates a producer against `brokers`. Consumers are created per
    /// subscription in consumer group `group_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Broker`] if the producer cannot be created.
    pub fn new(brokers: &str, group_id: &str) -> Result<Self, TransportError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "30000")
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .create::<FutureProducer>()
            .map_err(|e| TransportError::Broker(e.to_string()))?;

        tracing::info!(brokers, group_id, "kafka producer created");
        Ok(Self {
            brokers: brokers.to_string(),
            group_id: group_id.to_string(),
            producer,
            consumers: RwLock::new(HashMap::new()),
        })
    }
}

impl QueueTransport for KafkaTransport {
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| TransportError::Broker(e.to_string()))?;
        let topic = NewTopic::new(queue, 1, TopicReplication::Fixed(1));
        let results = admin
            .create_topics(&[topic], &AdminOptions::new())
            .await
            .map_err(|e| TransportError::Broker(e.to_string()))?;
        for result in results {
            match result {
                Ok(_) | Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {}
                Err((name, code)) => {
                    return Err(TransportError::Broker(format!(
                        "failed to create topic {name}: {code}"
                    )));
                }
            }
        }
        tracing::debug!(queue, "topic declared");
        Ok(())
    }

    async fn purge_queue(&self, queue: &str) -> Result<u64, TransportError> {
        tracing::warn!(queue, "kafka topics cannot be purged by a client; skipping");
        Ok(0)
    }

    async fn publish(
        &self,
        queue: &str,
        payload: Vec<u8>,
        content_type: &str,
    ) -> Result<(), TransportError> {
        let headers = OwnedHeaders::new().insert(Header {
            key: CONTENT_TYPE_HEADER,
            value: Some(content_type),
        });
        let record = FutureRecord::<(), Vec<u8>>::to(queue)
            .payload(&payload)
            .headers(headers);
        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(e, _)| TransportError::Broker(e.to_string()))
    }

    async fn subscribe(&self, queue: &str) -> Result<MessageStream, TransportError> {
        let mut consumers = self.consumers.write().await;
        if consumers.contains_key(queue) {
            return Err(TransportError::AlreadySubscribed(queue.to_string()));
        }
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| TransportError::Broker(e.to_string()))?;
        consumer
            .subscribe(&[queue])
            .map_err(|e| TransportError::Broker(e.to_string()))?;
        let consumer = Arc::new(consumer);
        consumers.insert(queue.to_string(), Arc::clone(&consumer));
        drop(consumers);
        tracing::info!(queue, group_id = %self.group_id, "subscribed to kafka topic");

        let (tx, rx) = mpsc::channel::<Delivery>(PREFETCH);
        tokio::spawn(async move {
            loop {
                match consumer.recv().await {
                    Ok(msg) => {
                        let content_type = msg.headers().and_then(|headers| {
                            headers
                                .iter()
                                .find(|h| h.key == CONTENT_TYPE_HEADER)
                                .and_then(|h| h.value)
                                .map(|v| String::from_utf8_lossy(v).into_owned())
                        });
                        let payload = msg.payload().map(<[u8]>::to_vec).unwrap_or_default();
                        let delivery =
                            Delivery::new(payload, content_type).with_receipt(DeliveryReceipt {
                                topic: msg.topic().to_string(),
                                partition: msg.partition(),
                                offset: msg.offset(),
                            });
                        if tx.send(delivery).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "kafka consumer error");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
            tracing::debug!("kafka subscription dropped");
        });

        Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (delivery, rx))
        })))
    }

    /// Stores the offset after `delivery` for the next auto-commit.
    async fn ack(&self, delivery: &Delivery) -> Result<(), TransportError> {
        let Some(receipt) = delivery.receipt.as_ref() else {
            return Ok(());
        };
        let consumer = self
            .consumers
            .read()
            .await
            .get(&receipt.topic)
            .cloned()
            .ok_or_else(|| TransportError::UnknownQueue(receipt.topic.clone()))?;

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &receipt.topic,
                receipt.partition,
                Offset::Offset(receipt.offset + 1),
            )
            .map_err(|e| TransportError::Broker(e.to_string()))?;
        consumer
            .store_offsets(&offsets)
            .map_err(|e| TransportError::Broker(e.to_string()))
    }
}
