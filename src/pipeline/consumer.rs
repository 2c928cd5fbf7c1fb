//! Consumer: drains the queue into the record store.
//!
//! Each message moves `Received → Decoded → {Inserted | Diverted | Dropped}`
//! in one step. Nothing is carried between messages apart from the outcome
//! counters in [`PipelineStats`]. A message is acknowledged to the transport
//! only after its outcome is reached, dropped messages included.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;

use super::stats::{PipelineStats, StatsSnapshot};
use crate::domain::{CONTENT_TYPE_JSON, EventRecord};
use crate::error::{StorageError, TransportError};
use crate::storage::RecordStore;
use crate::transport::{Delivery, QueueTransport};

/// Why a message was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The payload did not decode to an [`EventRecord`].
    Decode,
    /// The primary insert failed for a reason other than a duplicate key.
    Store,
}

/// Terminal state of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Written to the primary store.
    Inserted(EventRecord),
    /// Duplicate `record_id`, written to the skipped store.
    Diverted(EventRecord),
    /// Duplicate `record_id`, and the skipped-store insert failed as well.
    DivertFailed(EventRecord),
    /// Discarded.
    Dropped(DropReason),
}

/// Long-running queue consumer.
#[derive(Debug)]
pub struct Consumer<T, S> {
    transport: Arc<T>,
    store: Arc<S>,
    queue: String,
    stats: Arc<PipelineStats>,
}

impl<T, S> Consumer<T, S>
where
    T: QueueTransport,
    S: RecordStore,
{
    /// Creates a consumer for `queue` writing into `store`.
    #[must_use]
    pub fn new(transport: Arc<T>, queue: impl Into<String>, store: Arc<S>) -> Self {
        Self {
            transport,
            store,
            queue: queue.into(),
            stats: Arc::new(PipelineStats::new()),
        }
    }

    /// Shares `stats` instead of a private set of counters.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Outcome counters updated by this consumer.
    #[must_use]
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Subscribes and processes messages one at a time until the stream
    /// ends or `shutdown` turns `true`.
    ///
    /// The stop signal is only observed between messages; a store call in
    /// progress always completes. Dropping the sender without signalling
    /// leaves the consumer running until the stream ends.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] if the subscription cannot be opened.
    /// Per-message failures are logged and never end the loop.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<StatsSnapshot, TransportError> {
        let mut messages = self.transport.subscribe(&self.queue).await?;
        tracing::info!(queue = %self.queue, "consumer started");

        loop {
            let delivery = tokio::select! {
                biased;
                () = stop_requested(&mut shutdown) => {
                    tracing::info!(queue = %self.queue, "consumer stop requested");
                    break;
                }
                next = messages.next() => match next {
                    Some(delivery) => delivery,
                    None => {
                        tracing::info!(queue = %self.queue, "message stream closed");
                        break;
                    }
                },
            };
            self.handle_delivery(&delivery).await;
            if let Err(e) = self.transport.ack(&delivery).await {
                tracing::warn!(queue = %self.queue, error = %e, "failed to acknowledge message");
            }
        }

        let summary = self.stats.snapshot();
        tracing::info!(
            inserted = summary.inserted,
            diverted = summary.diverted,
            divert_failed = summary.divert_failed,
            dropped_decode = summary.dropped_decode,
            dropped_store = summary.dropped_store,
            "consumer stopped"
        );
        Ok(summary)
    }

    /// Processes one delivery and counts its outcome.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Outcome {
        if let Some(content_type) = delivery.content_type.as_deref()
            && content_type != CONTENT_TYPE_JSON
        {
            tracing::warn!(content_type, "unexpected content type, decoding anyway");
        }
        let outcome = self.handle_message(&delivery.payload).await;
        self.stats.record(&outcome);
        outcome
    }

    /// Decodes and persists one payload.
    ///
    /// A duplicate `record_id` is diverted to the skipped store; the
    /// primary insert is never retried.
    pub async fn handle_message(&self, payload: &[u8]) -> Outcome {
        let record = match EventRecord::decode(payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, bytes = payload.len(), "discarding undecodable message");
                return Outcome::Dropped(DropReason::Decode);
            }
        };

        match self.store.insert_primary(&record).await {
            Ok(()) => {
                tracing::info!(
                    owner_id = record.owner_id,
                    record_id = record.record_id,
                    amount = record.amount,
                    "inserted record"
                );
                Outcome::Inserted(record)
            }
            Err(StorageError::DuplicateKey { .. }) => self.divert(record).await,
            Err(e) => {
                tracing::error!(record_id = record.record_id, error = %e, "failed to insert record, dropping");
                Outcome::Dropped(DropReason::Store)
            }
        }
    }

    async fn divert(&self, record: EventRecord) -> Outcome {
        match self.store.insert_secondary(&record).await {
            Ok(()) => {
                tracing::info!(
                    owner_id = record.owner_id,
                    record_id = record.record_id,
                    amount = record.amount,
                    "duplicate record diverted to skipped store"
                );
                Outcome::Diverted(record)
            }
            Err(e) => {
                tracing::error!(record_id = record.record_id, error = %e, "failed to divert duplicate record");
                Outcome::DivertFailed(record)
            }
        }
    }
}

/// Resolves once `shutdown` holds `true`. Never resolves if the sender is
/// dropped first.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
