//! Producer: publishes event records onto the queue.
//!
//! Publishing is best effort per record. A record that fails to encode or
//! publish is logged and skipped; the rest of the batch still goes out.

use crate::domain::{CONTENT_TYPE_JSON, EventRecord};
use crate::error::IngestError;
use crate::transport::QueueTransport;

/// The fixed batch published at startup.
pub const SEED_BATCH: [EventRecord; 3] = [
    EventRecord::new(1, 1, 10),
    EventRecord::new(1, 2, 20),
    EventRecord::new(2, 3, 20),
];

/// Result of publishing a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Records accepted by the transport.
    pub published: usize,
    /// Records that failed to encode or publish.
    pub failed: usize,
}

impl PublishReport {
    /// Number of records attempted.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.published + self.failed
    }
}

/// Encodes and publishes one record.
///
/// # Errors
///
/// Returns [`IngestError::Schema`] if encoding fails or
/// [`IngestError::Transport`] if the transport rejects the message.
pub async fn publish_record<T: QueueTransport>(
    transport: &T,
    queue: &str,
    record: &EventRecord,
) -> Result<(), IngestError> {
    let body = record.encode()?;
    transport.publish(queue, body, CONTENT_TYPE_JSON).await?;
    Ok(())
}

/// Publishes every record in `records`, in order, independently.
pub async fn publish_batch<T: QueueTransport>(
    transport: &T,
    queue: &str,
    records: &[EventRecord],
) -> PublishReport {
    let mut report = PublishReport::default();
    for record in records {
        match publish_record(transport, queue, record).await {
            Ok(()) => {
                report.published += 1;
                tracing::info!(
                    queue,
                    owner_id = record.owner_id,
                    record_id = record.record_id,
                    amount = record.amount,
                    "published record"
                );
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(queue, record_id = record.record_id, error = %e, "failed to publish record");
            }
        }
    }
    report
}

/// Publishes [`SEED_BATCH`]. Returns once every record has been attempted.
pub async fn publish_seed<T: QueueTransport>(transport: &T, queue: &str) -> PublishReport {
    let report = publish_batch(transport, queue, &SEED_BATCH).await;
    tracing::info!(
        queue,
        published = report.published,
        failed = report.failed,
        "seed batch published"
    );
    report
}
