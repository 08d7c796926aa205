use crate::store::StoreError;
use std::path::PathBuf;

/// Errors that can occur while loading or applying declared spending plans
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("invalid spending plan configuration ({reason}): {entry}")]
    InvalidConfiguration { entry: String, reason: String },

    #[error("failed to read spending plans from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub(crate) fn invalid(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        ReconcileError::InvalidConfiguration {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}
