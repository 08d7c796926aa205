//! Per-request metadata threaded through every cache and store call.

/// Identifies the inbound call a cache or store operation is made on behalf of.
///
/// The limiter reads the caller's network address from here; everything else
/// only uses it for log correlation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDetails {
    /// Correlation id of the inbound call (may be empty for internal work)
    pub request_id: String,
    /// Network address of the caller, if known
    pub ip_address: Option<String>,
}

impl RequestDetails {
    pub fn new(request_id: impl Into<String>, ip_address: Option<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ip_address,
        }
    }

    /// Request details for work the process does on its own behalf
    /// (reconciliation, scheduled resets).
    pub fn internal(task: &str) -> Self {
        Self {
            request_id: task.to_string(),
            ip_address: None,
        }
    }

    /// Caller network address, treating an empty string as absent.
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref().filter(|ip| !ip.is_empty())
    }

    /// Log prefix used by every component, e.g. `[Request ID: abc]`.
    pub fn formatted_request_id(&self) -> String {
        format!("[Request ID: {}]", self.request_id)
    }
}
