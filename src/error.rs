//! Error types for every layer of the pipeline.
//!
//! Each layer owns a small [`thiserror`] enum. [`IngestError`] is the
//! umbrella used by startup code; per-message errors never travel past the
//! consumer loop.

use thiserror::Error;

/// Errors produced while encoding or decoding an [`crate::domain::EventRecord`].
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Payload is not a valid event record (malformed JSON, missing field,
    /// non-integer value).
    #[error("invalid event payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// Record could not be serialized.
    #[error("failed to encode event record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors produced by a [`crate::storage::RecordStore`] or while
/// establishing the store connection.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The primary store already holds a row with this `record_id`.
    #[error("duplicate record_id {record_id}")]
    DuplicateKey {
        /// The colliding idempotency key.
        record_id: i64,
    },

    /// Any other database failure. Not retried.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store could not be reached within the retry budget.
    #[error("store unreachable after {attempts} attempts: {source}")]
    ConnectExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: sqlx::Error,
    },

    /// Failure reported by a non-SQL backend.
    #[error("store error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Returns `true` for the uniqueness-violation outcome of a primary insert.
    #[must_use]
    pub const fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

/// Errors produced by a [`crate::transport::QueueTransport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The queue has not been declared.
    #[error("queue not declared: {0}")]
    UnknownQueue(String),

    /// The queue already has an active subscriber.
    #[error("queue {0} already has a subscriber")]
    AlreadySubscribed(String),

    /// The queue has been closed and accepts no more messages.
    #[error("queue {0} is closed")]
    Closed(String),

    /// The broker rejected the operation.
    #[error("broker error: {0}")]
    Broker(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Raw value that failed to parse.
        value: String,
    },
}

/// Top-level error for startup and orchestration code.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Store connection or schema failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Queue transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Record encoding failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}
