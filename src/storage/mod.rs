//! Storage gateway: durable primary and skipped-record tables.
//!
//! [`RecordStore`] is the seam the consumer is generic over. The
//! production implementation is [`PostgresGateway`]; [`InMemoryStore`]
//! mirrors its uniqueness semantics for tests and local runs.

pub mod classify;
pub mod memory;
pub mod postgres;
pub mod retry;

use std::future::Future;

use crate::domain::EventRecord;
use crate::error::StorageError;

pub use classify::is_unique_violation;
pub use memory::InMemoryStore;
pub use postgres::PostgresGateway;
pub use retry::{RetryPolicy, retry_with_policy};

/// Name of the primary table.
pub const PRIMARY_TABLE: &str = "payment_events";

/// Name of the secondary (skipped) table.
pub const SECONDARY_TABLE: &str = "skipped_messages";

/// Insert operations the consumer needs from a durable store.
///
/// Implementations must be safe for concurrent use.
pub trait RecordStore: Send + Sync {
    /// Inserts into the primary store.
    ///
    /// Returns [`StorageError::DuplicateKey`] when `record.record_id` is
    /// already present; any other failure is returned as-is and is not
    /// retried by the caller.
    fn insert_primary(
        &self,
        record: &EventRecord,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Inserts into the secondary store. There is no duplicate branch here:
    /// a collision is reported like any other failure.
    fn insert_secondary(
        &self,
        record: &EventRecord,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}
