use crate::cache::CacheError;

/// Errors that can occur during spending plan store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("spending plan not found: {0}")]
    PlanNotFound(String),

    #[error("no spending plan linked to eth address")]
    EthAddressPlanNotFound(String),

    #[error("no spending plan linked to ip address")]
    IpAddressPlanNotFound(String),

    #[error("spending plan store unavailable: {0}")]
    Unavailable(#[from] CacheError),
}

impl StoreError {
    /// Whether the error means "absent" rather than "could not tell".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::PlanNotFound(_)
                | StoreError::EthAddressPlanNotFound(_)
                | StoreError::IpAddressPlanNotFound(_)
        )
    }
}
