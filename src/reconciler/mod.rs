//! Declared spending plan reconciliation
//!
//! Operators declare privileged plans and the addresses that belong to them
//! in a JSON list. At startup the declaration is compared with what the
//! stores hold and the difference is written, so repeated runs over the same
//! declaration write nothing.
//!
//! Reconciliation runs in three stages:
//! 1. Validate every declared entry. One bad entry aborts before any write.
//! 2. Observe the stored plans and links and [`diff`] them against the declaration.
//! 3. Apply the resulting [`ReconcilePlan`]: creations, relinks, link
//!    removals, then plan removals.

mod declared;
mod diff;
mod error;

pub use declared::{validate_all, DeclaredPlan, SpendingPlanConfig, SpendingPlansSource};
pub use diff::{
    diff, LinkKind, LinkRemoval, ObservedState, PlanCreation, PlanRemoval, ReconcilePlan, Relink,
    TierConflict,
};
pub use error::ReconcileError;

use crate::cache::Ttl;
use crate::request::RequestDetails;
use crate::store::{AddressPlanLink, PlanStores};
use std::time::Instant;

/// Applies a declared plan list to the stores.
#[derive(Clone)]
pub struct PlanReconciler {
    stores: PlanStores,
}

impl PlanReconciler {
    pub fn new(stores: PlanStores) -> Self {
        Self { stores }
    }

    /// Load the declaration from `source` and reconcile it. Returns `None`
    /// when the source is a file that does not exist.
    pub async fn populate_from_source(
        &self,
        source: &SpendingPlansSource,
    ) -> Result<Option<ReconcilePlan>, ReconcileError> {
        let Some(configs) = source.load()? else {
            tracing::info!(
                source = %source.describe(),
                "No spending plans configuration found, skipping reconciliation"
            );
            return Ok(None);
        };
        tracing::info!(
            source = %source.describe(),
            entries = configs.len(),
            "Loaded spending plans configuration"
        );
        self.reconcile(&configs).await.map(Some)
    }

    /// Bring the stores in line with `configs` and return the writes made.
    pub async fn reconcile(
        &self,
        configs: &[SpendingPlanConfig],
    ) -> Result<ReconcilePlan, ReconcileError> {
        let start = Instant::now();
        let declared = validate_all(configs)?;
        let request = RequestDetails::internal("plan-reconciler");

        let observed = self.observe(&request).await?;
        let plan = diff(&observed, &declared);

        for conflict in &plan.tier_conflicts {
            tracing::warn!(
                plan_id = %conflict.id,
                declared = %conflict.declared,
                stored = %conflict.stored,
                "Declared subscription tier differs from the stored plan, keeping stored tier"
            );
        }

        if plan.is_empty() {
            tracing::info!(
                plans = declared.len(),
                "Spending plans already match configuration"
            );
            return Ok(plan);
        }

        self.apply(&plan, &request).await?;
        tracing::info!(
            created = plan.to_create.len(),
            relinked = plan.to_relink.len(),
            unlinked = plan.to_delete_links.len(),
            deleted = plan.to_delete_plans.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Spending plans reconciled"
        );
        Ok(plan)
    }

    async fn observe(&self, request: &RequestDetails) -> Result<ObservedState, ReconcileError> {
        let plans = self.stores.plans.find_all(request).await?;
        let eth_links = self.stores.eth_links.find_all(request).await?;
        let ip_links = self.stores.ip_links.find_all(request).await?;

        Ok(ObservedState {
            plans: plans
                .into_iter()
                .map(|p| (p.id, p.subscription_tier))
                .collect(),
            eth_links: eth_links
                .into_iter()
                .map(|l| (l.address, l.plan_id))
                .collect(),
            ip_links: ip_links
                .into_iter()
                .map(|l| (l.address, l.plan_id))
                .collect(),
        })
    }

    async fn apply(
        &self,
        plan: &ReconcilePlan,
        request: &RequestDetails,
    ) -> Result<(), ReconcileError> {
        for creation in &plan.to_create {
            self.stores
                .plans
                .create(creation.tier, Ttl::Forever, Some(creation.id.clone()), request)
                .await?;
            tracing::info!(
                "Created spending plan \"{}\" with ID \"{}\" and subscription tier \"{}\"",
                creation.name,
                creation.id,
                creation.tier
            );
        }

        for relink in &plan.to_relink {
            let link = AddressPlanLink::new(relink.address.clone(), relink.plan_id.clone());
            match relink.kind {
                LinkKind::Eth => self.stores.eth_links.save(&link, request, Ttl::Forever).await?,
                LinkKind::Ip => self.stores.ip_links.save(&link, request, Ttl::Forever).await?,
            }
            tracing::debug!(
                kind = %relink.kind,
                address = %relink.address,
                plan_id = %relink.plan_id,
                previous = ?relink.previous,
                "Linked address to spending plan"
            );
        }

        for removal in &plan.to_delete_links {
            match removal.kind {
                LinkKind::Eth => self.stores.eth_links.delete(&removal.address, request).await?,
                LinkKind::Ip => self.stores.ip_links.delete(&removal.address, request).await?,
            }
            tracing::info!(
                kind = %removal.kind,
                address = %removal.address,
                plan_id = %removal.plan_id,
                "Removed address no longer declared for spending plan"
            );
        }

        for removal in &plan.to_delete_plans {
            tracing::info!(
                "Deleting spending plan with ID \"{}\", as it is no longer in the spending plan configuration...",
                removal.id
            );
            self.stores.plans.delete(&removal.id, request).await?;
            self.stores
                .eth_links
                .delete_all_by_plan_id(&removal.id, request)
                .await?;
            self.stores
                .ip_links
                .delete_all_by_plan_id(&removal.id, request)
                .await?;
        }

        Ok(())
    }
}
