//! Expense recording endpoint handler.

use super::{request_details, ApiError, AppState, ExpenseRequest};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

/// POST /v1/expenses - Charge `cost` to the caller's plan and the global budget.
pub async fn handle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ExpenseRequest>,
) -> Result<StatusCode, ApiError> {
    if body.cost < 0 {
        return Err(ApiError::bad_request("cost must not be negative"));
    }
    let request = request_details(&headers, body.ip_address.clone());
    state
        .limiter
        .add_expense(body.cost, body.eth_address.as_deref(), &request)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
