//! # Limiter API
//!
//! HTTP endpoints the relay calls around every billable JSON-RPC call.
//!
//! ## Endpoints
//!
//! - `POST /v1/admission` - Whether a call may spend its estimated fee
//! - `POST /v1/expenses` - Record the actual cost of a call
//! - `GET /v1/plans/:id` - Spending plan with spend history
//! - `GET /v1/budget` - Global budget window
//! - `GET /metrics` - Prometheus metrics
//!
//! ## Example
//!
//! ```no_run
//! use tollgate::api::{create_router, AppState};
//! use tollgate::cache::{CacheClient, InMemoryCache};
//! use tollgate::config::TollgateConfig;
//! use tollgate::limiter::SpendLimiter;
//! use tollgate::store::PlanStores;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(TollgateConfig::default());
//! let cache = CacheClient::new(
//!     Arc::new(InMemoryCache::new()),
//!     config.cache.operation_timeout(),
//! );
//! let stores = PlanStores::new(cache);
//! let limiter = Arc::new(SpendLimiter::new(stores.clone(), config.limiter.clone()));
//!
//! let state = Arc::new(AppState::new(limiter, stores, config));
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:7546").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Errors share one envelope:
//! ```json
//! {
//!   "error": {
//!     "message": "cannot add expense without an eth address or ip address",
//!     "type": "invalid_request_error",
//!     "code": "invalid_request_error"
//!   }
//! }
//! ```

mod admission;
mod budget;
mod expenses;
mod plans;
pub mod types;

pub use types::*;

use crate::config::TollgateConfig;
use crate::limiter::SpendLimiter;
use crate::request::RequestDetails;
use crate::store::PlanStores;
use axum::{
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Header carrying the relay's correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub limiter: Arc<SpendLimiter>,
    pub stores: PlanStores,
    pub config: Arc<TollgateConfig>,
    /// Renders the Prometheus exposition text
    pub prometheus: PrometheusHandle,
}

impl AppState {
    pub fn new(limiter: Arc<SpendLimiter>, stores: PlanStores, config: Arc<TollgateConfig>) -> Self {
        Self::with_prometheus(limiter, stores, config, crate::metrics::prometheus_handle())
    }

    pub fn with_prometheus(
        limiter: Arc<SpendLimiter>,
        stores: PlanStores,
        config: Arc<TollgateConfig>,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self {
            limiter,
            stores,
            config,
            prometheus,
        }
    }
}

/// Create the main API router with all endpoints configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;
    Router::new()
        .route("/v1/admission", post(admission::handle))
        .route("/v1/expenses", post(expenses::handle))
        .route("/v1/plans/:id", get(plans::handle))
        .route("/v1/budget", get(budget::handle))
        .route("/metrics", get(crate::metrics::handler::metrics_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request details for an inbound call: the relay's correlation id if it
/// sent one, a fresh one otherwise.
pub(crate) fn request_details(headers: &HeaderMap, ip_address: Option<String>) -> RequestDetails {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(crate::logging::generate_request_id);
    RequestDetails::new(request_id, ip_address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("relay-42"));
        let request = request_details(&headers, Some("10.0.0.1".to_string()));
        assert_eq!(request.request_id, "relay-42");
        assert_eq!(request.ip_address(), Some("10.0.0.1"));
    }

    #[test]
    fn test_request_id_generated_when_absent() {
        let request = request_details(&HeaderMap::new(), None);
        assert_eq!(request.request_id.len(), 36);
        assert!(request.ip_address().is_none());
    }
}
