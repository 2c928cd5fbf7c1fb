//! HTTP surface: the liveness endpoint only.

pub mod handlers;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete HTTP router.
pub fn build_router() -> Router<AppState> {
    Router::new().merge(handlers::system::routes())
}
