//! Admission check endpoint handler.

use super::{request_details, AdmissionRequest, AdmissionResponse, ApiError, AppState};
use crate::limiter::Admission;
use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

/// POST /v1/admission - Decide whether a call may spend `estimatedFee`.
///
/// A store failure while resolving the caller's plan is reported as 503
/// instead of a limited response, so the relay can tell "refused" from
/// "could not decide". A negative `estimatedFee` is a 400.
pub async fn handle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AdmissionRequest>,
) -> Result<Json<AdmissionResponse>, ApiError> {
    if body.estimated_fee < 0 {
        return Err(ApiError::bad_request("estimatedFee must not be negative"));
    }
    let request = request_details(&headers, body.ip_address.clone());
    let admission = state
        .limiter
        .admit(
            &body.mode,
            &body.method,
            body.eth_address.as_deref(),
            &request,
            body.estimated_fee,
        )
        .await;

    if let Admission::Unresolved { error } = &admission {
        return Err(ApiError::service_unavailable(error));
    }
    Ok(Json(admission.into()))
}
