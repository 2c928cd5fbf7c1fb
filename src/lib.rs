//! # payment-ingest
//!
//! Queue-driven ingestion pipeline for payment events.
//!
//! A producer publishes event records onto a durable queue; a consumer
//! drains the queue and persists each record into PostgreSQL. Records
//! whose `record_id` already exists are not lost: they are diverted to a
//! secondary "skipped" table for inspection. Delivery is at-least-once
//! with idempotent-by-key persistence.
//!
//! ## Architecture
//!
//! ```text
//! Producer (pipeline/)
//!     │
//!     ├── QueueTransport (transport/)   in-memory | kafka
//!     │
//! Consumer (pipeline/)
//!     │
//!     ├── RecordStore (storage/)        postgres | in-memory
//!     │       ├── payment_events
//!     │       └── skipped_messages
//!     │
//!     └── PipelineStats ── GET /health (api/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod storage;
pub mod transport;
