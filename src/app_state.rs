//! Shared application state injected into the Axum handlers.

use std::sync::Arc;

use crate::pipeline::PipelineStats;

/// State available to handlers via Axum's `State` extractor.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Consumer outcome counters.
    pub stats: Arc<PipelineStats>,
}
