//! Global budget endpoint handler.

use super::{AppState, BudgetResponse};
use axum::{extract::State, Json};
use std::sync::Arc;

/// GET /v1/budget - Current window of the global budget.
pub async fn handle(State(state): State<Arc<AppState>>) -> Json<BudgetResponse> {
    Json(BudgetResponse {
        total: state.limiter.total_budget(),
        remaining: state.limiter.remaining_budget(),
        reset_at: state.limiter.reset_at(),
    })
}
