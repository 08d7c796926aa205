//! Spending plan store module.
//!
//! Cache-backed persistence for spending plans and for the two address
//! association collections (chain address and network address) that map a
//! caller to the plan it spends from.

mod address;
mod error;
mod plan;
mod tier;

pub use address::*;
pub use error::*;
pub use plan::*;
pub use tier::*;

use crate::cache::CacheClient;
use std::sync::Arc;

/// The plan store and both link stores over one shared cache.
#[derive(Clone)]
pub struct PlanStores {
    pub plans: Arc<SpendingPlanStore>,
    pub eth_links: Arc<EthAddressPlanStore>,
    pub ip_links: Arc<IpAddressPlanStore>,
}

impl PlanStores {
    pub fn new(cache: CacheClient) -> Self {
        Self {
            plans: Arc::new(SpendingPlanStore::new(cache.clone())),
            eth_links: Arc::new(EthAddressPlanStore::new(cache.clone())),
            ip_links: Arc::new(IpAddressPlanStore::new(cache)),
        }
    }
}
