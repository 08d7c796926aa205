use super::StoreError;
use crate::cache::{CacheClient, Ttl};
use crate::request::RequestDetails;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// A caller address associated with a spending plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPlanLink {
    pub address: String,
    pub plan_id: String,
}

impl AddressPlanLink {
    pub fn new(address: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            plan_id: plan_id.into(),
        }
    }
}

/// Flavor of caller address. Each flavor lives under its own key prefix so
/// links of different kinds never collide, even for identical strings.
pub trait AddressKind: Send + Sync + 'static {
    /// Key prefix of the link collection.
    const COLLECTION: &'static str;
    /// Short name for logs and metrics (`"eth"`, `"ip"`).
    const LABEL: &'static str;

    fn not_found(address: &str) -> StoreError;
}

/// Chain (EVM) account address.
#[derive(Debug)]
pub enum EthAddress {}

/// Network (IP) address of the caller.
#[derive(Debug)]
pub enum IpAddress {}

impl AddressKind for EthAddress {
    const COLLECTION: &'static str = "ethAddressSpendingPlan";
    const LABEL: &'static str = "eth";

    fn not_found(address: &str) -> StoreError {
        StoreError::EthAddressPlanNotFound(address.to_string())
    }
}

impl AddressKind for IpAddress {
    const COLLECTION: &'static str = "ipAddressSpendingPlan";
    const LABEL: &'static str = "ip";

    fn not_found(address: &str) -> StoreError {
        StoreError::IpAddressPlanNotFound(address.to_string())
    }
}

/// Address to plan-id links for one [`AddressKind`].
///
/// `save` overwrites unconditionally. Nothing here checks that the linked
/// plan exists; keeping links and plans consistent is up to the caller.
pub struct AddressPlanStore<K: AddressKind> {
    cache: CacheClient,
    _kind: PhantomData<fn() -> K>,
}

pub type EthAddressPlanStore = AddressPlanStore<EthAddress>;
pub type IpAddressPlanStore = AddressPlanStore<IpAddress>;

impl<K: AddressKind> Clone for AddressPlanStore<K> {
    fn clone(&self) -> Self {
        Self::new(self.cache.clone())
    }
}

impl<K: AddressKind> AddressPlanStore<K> {
    pub fn new(cache: CacheClient) -> Self {
        Self {
            cache,
            _kind: PhantomData,
        }
    }

    pub fn kind(&self) -> &'static str {
        K::LABEL
    }

    pub async fn exists_by_address(
        &self,
        address: &str,
        request: &RequestDetails,
    ) -> Result<bool, StoreError> {
        Ok(self
            .cache
            .exists(&key::<K>(address), "existsByAddress", request)
            .await?)
    }

    pub async fn find_by_address(
        &self,
        address: &str,
        request: &RequestDetails,
    ) -> Result<AddressPlanLink, StoreError> {
        let link = self
            .cache
            .get::<AddressPlanLink>(&key::<K>(address), "findByAddress", request)
            .await?
            .ok_or_else(|| K::not_found(address))?;
        tracing::trace!(
            request_id = %request.request_id,
            kind = K::LABEL,
            address,
            plan_id = %link.plan_id,
            "Retrieved address spending plan link"
        );
        Ok(link)
    }

    /// Link the address to the plan, replacing any existing link.
    pub async fn save(
        &self,
        link: &AddressPlanLink,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<(), StoreError> {
        self.cache
            .set(&key::<K>(&link.address), link, "save", request, ttl)
            .await?;
        tracing::trace!(
            request_id = %request.request_id,
            kind = K::LABEL,
            address = %link.address,
            plan_id = %link.plan_id,
            "Saved address spending plan link"
        );
        Ok(())
    }

    /// Link the address only if it has no live link yet. Returns whether
    /// the link was written.
    pub async fn save_if_absent(
        &self,
        link: &AddressPlanLink,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<bool, StoreError> {
        let written = self
            .cache
            .set_if_absent(&key::<K>(&link.address), link, "saveIfAbsent", request, ttl)
            .await?;
        tracing::trace!(
            request_id = %request.request_id,
            kind = K::LABEL,
            address = %link.address,
            plan_id = %link.plan_id,
            written,
            "Conditionally saved address spending plan link"
        );
        Ok(written)
    }

    pub async fn delete(&self, address: &str, request: &RequestDetails) -> Result<(), StoreError> {
        self.cache
            .delete(&key::<K>(address), "delete", request)
            .await?;
        tracing::trace!(
            request_id = %request.request_id,
            kind = K::LABEL,
            address,
            "Deleted address spending plan link"
        );
        Ok(())
    }

    /// Remove every link pointing at `plan_id`. Scans the whole collection.
    pub async fn delete_all_by_plan_id(
        &self,
        plan_id: &str,
        request: &RequestDetails,
    ) -> Result<usize, StoreError> {
        let stale: Vec<AddressPlanLink> = self
            .find_all_op("deleteAllByPlanId", request)
            .await?
            .into_iter()
            .filter(|link| link.plan_id == plan_id)
            .collect();

        for link in &stale {
            self.cache
                .delete(&key::<K>(&link.address), "deleteAllByPlanId", request)
                .await?;
        }

        if !stale.is_empty() {
            tracing::debug!(
                request_id = %request.request_id,
                kind = K::LABEL,
                plan_id,
                removed = stale.len(),
                "Removed address links of spending plan"
            );
        }
        Ok(stale.len())
    }

    /// Every live link of this kind, ordered by address key.
    pub async fn find_all(&self, request: &RequestDetails) -> Result<Vec<AddressPlanLink>, StoreError> {
        self.find_all_op("findAll", request).await
    }

    async fn find_all_op(
        &self,
        op: &str,
        request: &RequestDetails,
    ) -> Result<Vec<AddressPlanLink>, StoreError> {
        let keys = self
            .cache
            .keys(&format!("{}:*", K::COLLECTION), op, request)
            .await?;
        let results = join_all(
            keys.iter()
                .map(|key| self.cache.get::<AddressPlanLink>(key, op, request)),
        )
        .await;

        let mut links = Vec::with_capacity(results.len());
        for result in results {
            // A link that expired between the scan and the read is skipped.
            if let Some(link) = result? {
                links.push(link);
            }
        }
        Ok(links)
    }
}

fn key<K: AddressKind>(address: &str) -> String {
    format!("{}:{}", K::COLLECTION, address)
}
