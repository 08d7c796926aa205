//! Request and response bodies of the limiter API.

use crate::limiter::{Admission, LimiterError};
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// POST /v1/admission request body.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Relay mode the call runs in, used as a metric label
    pub mode: String,
    /// JSON-RPC method name
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub estimated_fee: i64,
}

/// POST /v1/admission response body.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionResponse {
    pub limited: bool,
    #[serde(flatten)]
    pub admission: Admission,
}

impl From<Admission> for AdmissionResponse {
    fn from(admission: Admission) -> Self {
        Self {
            limited: admission.is_limited(),
            admission,
        }
    }
}

/// POST /v1/expenses request body.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRequest {
    pub cost: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// GET /v1/budget response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetResponse {
    pub total: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

/// Error response body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: ApiErrorBody,
}

/// Error details.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiError {
    fn with_code(message: &str, r#type: &str, code: &str) -> Self {
        Self {
            error: ApiErrorBody {
                message: message.to_string(),
                r#type: r#type.to_string(),
                code: Some(code.to_string()),
            },
        }
    }

    /// Create a bad request error (400).
    pub fn bad_request(message: &str) -> Self {
        Self::with_code(message, "invalid_request_error", "invalid_request_error")
    }

    /// Create a not found error (404).
    pub fn not_found(message: &str) -> Self {
        Self::with_code(message, "invalid_request_error", "not_found")
    }

    /// Create a service unavailable error (503).
    pub fn service_unavailable(message: &str) -> Self {
        Self::with_code(message, "server_error", "service_unavailable")
    }

    /// Get the HTTP status code for this error.
    fn status_code(&self) -> StatusCode {
        match self.error.code.as_deref() {
            Some("invalid_request_error") => StatusCode::BAD_REQUEST,
            Some("not_found") => StatusCode::NOT_FOUND,
            Some("service_unavailable") => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            ApiError::not_found(&err.to_string())
        } else {
            ApiError::service_unavailable(&err.to_string())
        }
    }
}

impl From<LimiterError> for ApiError {
    fn from(err: LimiterError) -> Self {
        match err {
            LimiterError::MissingIdentity | LimiterError::NegativeCost(_) => {
                ApiError::bad_request(&err.to_string())
            }
            LimiterError::Store(e) => ApiError::service_unavailable(&e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}
