use crate::store::StoreError;

/// Errors that can occur while recording spend
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    #[error("cannot add expense without an eth address or ip address")]
    MissingIdentity,

    #[error("expense cost must not be negative, got {0}")]
    NegativeCost(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}
