use super::{StoreError, SubscriptionTier};
use crate::cache::{CacheClient, Ttl};
use crate::request::RequestDetails;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

const PLAN_COLLECTION: &str = "spendingPlan";
const AMOUNT_SPENT_COLLECTION: &str = "spendingPlanAmountSpent";
const HISTORY_COLLECTION: &str = "spendingPlanHistory";
const TIER_INDEX_COLLECTION: &str = "spendingPlanTier";

/// Persisted plan document. Accumulated spend and history live under their
/// own keys so they can be updated without rewriting the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanRecord {
    id: String,
    subscription_tier: SubscriptionTier,
    created_at: DateTime<Utc>,
    active: bool,
    /// Written with an expiry rather than kept forever.
    #[serde(default)]
    ad_hoc: bool,
}

/// A spending allowance with its accumulated spend in the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingPlan {
    pub id: String,
    pub subscription_tier: SubscriptionTier,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    /// Provisioned on first contact and dropped once unused for a window.
    /// Declared plans never expire.
    pub ad_hoc: bool,
    pub amount_spent: i64,
}

/// One recorded expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendEntry {
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

/// Plan plus its spend history, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedSpendingPlan {
    #[serde(flatten)]
    pub plan: SpendingPlan,
    pub spend_history: Vec<SpendEntry>,
}

/// CRUD over spending plans in the shared cache.
///
/// Key layout, per plan id:
/// - `spendingPlan:{id}`: the plan document
/// - `spendingPlanAmountSpent:{id}`: integer spend counter (absent means 0)
/// - `spendingPlanHistory:{id}`: list of [`SpendEntry`] for the current window
/// - `spendingPlanTier:{TIER}:{id}`: tier index entry
#[derive(Clone)]
pub struct SpendingPlanStore {
    cache: CacheClient,
}

impl SpendingPlanStore {
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// Create a plan. A fresh UUID is generated unless `id` is supplied.
    pub async fn create(
        &self,
        tier: SubscriptionTier,
        ttl: Ttl,
        id: Option<String>,
        request: &RequestDetails,
    ) -> Result<SpendingPlan, StoreError> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let record = PlanRecord {
            id: id.clone(),
            subscription_tier: tier,
            created_at: Utc::now(),
            active: true,
            ad_hoc: matches!(ttl, Ttl::After(_)),
        };

        self.cache
            .set(&plan_key(&id), &record, "create", request, ttl)
            .await?;
        self.cache
            .set(&tier_index_key(tier, &id), &id, "create", request, ttl)
            .await?;

        tracing::debug!(
            request_id = %request.request_id,
            plan_id = %id,
            tier = %tier,
            ?ttl,
            "Created spending plan"
        );
        Ok(record.into_plan(0))
    }

    pub async fn find_by_id(
        &self,
        id: &str,
        request: &RequestDetails,
    ) -> Result<SpendingPlan, StoreError> {
        let record = self.find_record(id, "findById", request).await?;
        let amount_spent = self.amount_spent(id, "findById", request).await?;
        Ok(record.into_plan(amount_spent))
    }

    pub async fn find_by_id_with_details(
        &self,
        id: &str,
        request: &RequestDetails,
    ) -> Result<DetailedSpendingPlan, StoreError> {
        let record = self.find_record(id, "findByIdWithDetails", request).await?;
        let amount_spent = self
            .amount_spent(id, "findByIdWithDetails", request)
            .await?;
        let spend_history = self
            .cache
            .get::<Vec<SpendEntry>>(&history_key(id), "findByIdWithDetails", request)
            .await?
            .unwrap_or_default();

        Ok(DetailedSpendingPlan {
            plan: record.into_plan(amount_spent),
            spend_history,
        })
    }

    /// Add `delta` to the plan's accumulated spend and append a history
    /// entry. `ttl` applies to the spend counter and history, and to the
    /// plan document and its tier index entry if the plan is ad hoc, so an
    /// ad hoc plan lives as long as it keeps being spent against.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PlanNotFound` if the plan has expired or was
    /// deleted; callers re-provision.
    pub async fn add_to_amount_spent(
        &self,
        id: &str,
        delta: i64,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<i64, StoreError> {
        let op = "addToAmountSpent";
        let record = self.find_record(id, op, request).await?;
        if record.ad_hoc {
            self.cache.set(&plan_key(id), &record, op, request, ttl).await?;
            self.cache
                .set(
                    &tier_index_key(record.subscription_tier, id),
                    &record.id,
                    op,
                    request,
                    ttl,
                )
                .await?;
        }

        let entry = SpendEntry {
            amount: delta,
            timestamp: Utc::now(),
        };
        self.cache
            .rpush(&history_key(id), &entry, op, request, ttl)
            .await?;
        let amount_spent = self
            .cache
            .incr_by(&amount_spent_key(id), delta, op, request, ttl)
            .await?;

        tracing::trace!(
            request_id = %request.request_id,
            plan_id = %id,
            delta,
            amount_spent,
            "Added to amount spent"
        );
        Ok(amount_spent)
    }

    /// Zero the accumulated spend of every plan present when the sweep
    /// starts and drop its spend history. Plans that vanish during the sweep
    /// are skipped.
    pub async fn reset_amount_spent_of_all_plans(
        &self,
        request: &RequestDetails,
    ) -> Result<(), StoreError> {
        let ids = self.all_ids("resetAmountSpentOfAllPlans", request).await?;
        tracing::debug!(
            request_id = %request.request_id,
            plans = ids.len(),
            "Resetting amount spent of all spending plans"
        );

        let results = join_all(ids.iter().map(|id| self.reset_amount_spent(id, request))).await;
        results.into_iter().collect()
    }

    /// Live plans of the given tier, found through the tier index.
    pub async fn find_all_active_by_subscription_tier(
        &self,
        tier: SubscriptionTier,
        request: &RequestDetails,
    ) -> Result<Vec<SpendingPlan>, StoreError> {
        let prefix = format!("{}:{}:", TIER_INDEX_COLLECTION, tier.as_str());
        let keys = self
            .cache
            .keys(
                &format!("{}*", prefix),
                "findAllActiveBySubscriptionTier",
                request,
            )
            .await?;
        let ids: Vec<String> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();

        let plans = self.find_many(&ids, request).await?;
        Ok(plans
            .into_iter()
            .filter(|plan| plan.active && plan.subscription_tier == tier)
            .collect())
    }

    /// Every live plan, ordered by id.
    pub async fn find_all(&self, request: &RequestDetails) -> Result<Vec<SpendingPlan>, StoreError> {
        let ids = self.all_ids("findAll", request).await?;
        self.find_many(&ids, request).await
    }

    /// Remove the plan, its spend counter, history and tier index entry.
    /// Links pointing at the plan are left to the caller.
    pub async fn delete(&self, id: &str, request: &RequestDetails) -> Result<(), StoreError> {
        self.cache.delete(&plan_key(id), "delete", request).await?;
        self.cache
            .delete(&amount_spent_key(id), "delete", request)
            .await?;
        self.cache.delete(&history_key(id), "delete", request).await?;
        for tier in SubscriptionTier::ALL {
            self.cache
                .delete(&tier_index_key(tier, id), "delete", request)
                .await?;
        }
        tracing::debug!(request_id = %request.request_id, plan_id = %id, "Deleted spending plan");
        Ok(())
    }

    async fn reset_amount_spent(&self, id: &str, request: &RequestDetails) -> Result<(), StoreError> {
        let op = "resetAmountSpentOfAllPlans";
        if self.amount_spent(id, op, request).await? != 0 {
            self.cache.delete(&amount_spent_key(id), op, request).await?;
        }
        if self.cache.exists(&history_key(id), op, request).await? {
            self.cache.delete(&history_key(id), op, request).await?;
        }
        Ok(())
    }

    async fn find_record(
        &self,
        id: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<PlanRecord, StoreError> {
        self.cache
            .get::<PlanRecord>(&plan_key(id), op, request)
            .await?
            .ok_or_else(|| StoreError::PlanNotFound(id.to_string()))
    }

    async fn amount_spent(
        &self,
        id: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<i64, StoreError> {
        Ok(self
            .cache
            .get::<i64>(&amount_spent_key(id), op, request)
            .await?
            .unwrap_or(0))
    }

    async fn all_ids(&self, op: &str, request: &RequestDetails) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{}:", PLAN_COLLECTION);
        let keys = self
            .cache
            .keys(&format!("{}*", prefix), op, request)
            .await?;
        Ok(keys
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Look up several plans, skipping any that vanished since they were listed.
    async fn find_many(
        &self,
        ids: &[String],
        request: &RequestDetails,
    ) -> Result<Vec<SpendingPlan>, StoreError> {
        let results = join_all(ids.iter().map(|id| self.find_by_id(id, request))).await;
        let mut plans = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(plan) => plans.push(plan),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(plans)
    }
}

impl PlanRecord {
    fn into_plan(self, amount_spent: i64) -> SpendingPlan {
        SpendingPlan {
            id: self.id,
            subscription_tier: self.subscription_tier,
            created_at: self.created_at,
            active: self.active,
            ad_hoc: self.ad_hoc,
            amount_spent,
        }
    }
}

fn plan_key(id: &str) -> String {
    format!("{}:{}", PLAN_COLLECTION, id)
}

fn amount_spent_key(id: &str) -> String {
    format!("{}:{}", AMOUNT_SPENT_COLLECTION, id)
}

fn history_key(id: &str) -> String {
    format!("{}:{}", HISTORY_COLLECTION, id)
}

fn tier_index_key(tier: SubscriptionTier, id: &str) -> String {
    format!("{}:{}:{}", TIER_INDEX_COLLECTION, tier.as_str(), id)
}
