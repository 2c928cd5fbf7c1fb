//! Producer and consumer halves of the ingestion pipeline.
//!
//! The two run as independent tasks and share nothing but the queue
//! transport and the record store.

pub mod consumer;
pub mod producer;
pub mod stats;

pub use consumer::{Consumer, DropReason, Outcome};
pub use producer::{PublishReport, SEED_BATCH, publish_batch, publish_record, publish_seed};
pub use stats::{PipelineStats, StatsSnapshot};
