//! # Metrics HTTP Handlers
//!
//! Axum handler for the Prometheus scrape endpoint.

use crate::api::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

/// Handler for GET /metrics endpoint (Prometheus text format).
///
/// Always returns 200 with the correct Content-Type for Prometheus scrapers,
/// even if no metrics have been recorded yet (returns empty text).
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Publish the current window before rendering so a fresh process reports it
    super::set_remaining_budget(state.limiter.remaining_budget());

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}
