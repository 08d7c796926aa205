//! Spending plan lookup endpoint handler.

use super::{request_details, ApiError, AppState};
use crate::store::DetailedSpendingPlan;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

/// GET /v1/plans/:id - Plan with its spend and spend history.
pub async fn handle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DetailedSpendingPlan>, ApiError> {
    let request = request_details(&headers, None);
    let plan = state
        .stores
        .plans
        .find_by_id_with_details(&id, &request)
        .await?;
    Ok(Json(plan))
}
