//! Spend limiter.
//!
//! Decides per call whether a fee may be spent, attributes recorded spend to
//! the caller's spending plan, and rolls the global budget over at the end of
//! every reset window.
//!
//! Two ceilings apply to every call:
//! - the global budget shared by all callers, tracked in process memory
//! - the caller's plan ceiling, set by the plan's subscription tier and
//!   tracked in the shared cache
//!
//! Callers are identified by their eth address, falling back to their ip
//! address. A caller with no plan gets a BASIC plan on first contact.
//!
//! The global budget window is per process. Several relay instances sharing
//! one cache each enforce the full budget on their own.

mod admission;
mod clock;
mod error;
pub mod schedule;

pub use admission::Admission;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LimiterError;
pub use schedule::ResetScheduler;

use crate::cache::Ttl;
use crate::config::LimiterConfig;
use crate::metrics;
use crate::request::RequestDetails;
use crate::store::{
    AddressKind, AddressPlanLink, AddressPlanStore, PlanStores, SpendingPlan, SpendingPlanStore,
    StoreError, SubscriptionTier,
};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

/// Global budget state for the current reset window.
#[derive(Debug, Clone, Copy)]
struct BudgetWindow {
    remaining: i64,
    reset_at: DateTime<Utc>,
}

pub struct SpendLimiter {
    stores: PlanStores,
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    window: Mutex<BudgetWindow>,
}

impl SpendLimiter {
    pub fn new(stores: PlanStores, config: LimiterConfig) -> Self {
        Self::with_clock(stores, config, Arc::new(SystemClock))
    }

    pub fn with_clock(stores: PlanStores, config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let reset_at = schedule::initial_reset(clock.now(), interval_delta(&config));
        let remaining = config.total_budget;
        metrics::set_remaining_budget(remaining);
        tracing::debug!(
            total_budget = remaining,
            %reset_at,
            "Spend limiter initialized"
        );

        Self {
            stores,
            config,
            clock,
            window: Mutex::new(BudgetWindow {
                remaining,
                reset_at,
            }),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn total_budget(&self) -> i64 {
        self.config.total_budget
    }

    pub fn remaining_budget(&self) -> i64 {
        self.window().remaining
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.window().reset_at
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_reset_due(&self) -> bool {
        self.now() >= self.reset_at()
    }

    /// Whether the call must be refused. See [`admit`](Self::admit).
    pub async fn should_limit(
        &self,
        mode: &str,
        method: &str,
        eth_address: Option<&str>,
        request: &RequestDetails,
        estimated_fee: i64,
    ) -> bool {
        self.admit(mode, method, eth_address, request, estimated_fee)
            .await
            .is_limited()
    }

    /// Admission check for a call that may cost up to `estimated_fee`.
    ///
    /// A negative fee is refused outright. Otherwise the window is rolled
    /// over first if it has ended. The global budget is checked before the
    /// caller is looked up; an exhausted budget limits every caller. A caller without any address is let through. A caller
    /// whose plan cannot be read because the store failed is refused.
    pub async fn admit(
        &self,
        mode: &str,
        method: &str,
        eth_address: Option<&str>,
        request: &RequestDetails,
        estimated_fee: i64,
    ) -> Admission {
        if estimated_fee < 0 {
            tracing::warn!(
                request_id = %request.request_id,
                mode,
                method,
                estimated_fee,
                "Negative estimated fee, limiting request"
            );
            return Admission::InvalidFee { estimated_fee };
        }

        if let Err(e) = self.roll_over_if_due(request).await {
            tracing::warn!(
                request_id = %request.request_id,
                error = %e,
                "Failed to reset spend limiter, keeping current window"
            );
        }

        let remaining = self.remaining_budget();
        if remaining <= 0 || estimated_fee > remaining {
            metrics::record_rate_limit_hit(mode, method);
            tracing::warn!(
                request_id = %request.request_id,
                mode,
                method,
                remaining,
                estimated_fee,
                "Global budget exhausted, limiting request"
            );
            return Admission::GlobalBudgetExhausted {
                remaining,
                estimated_fee,
            };
        }

        let eth_address = non_empty(eth_address);
        let ip_address = request.ip_address();
        if eth_address.is_none() && ip_address.is_none() {
            tracing::warn!(
                request_id = %request.request_id,
                mode,
                method,
                "No eth address or ip address provided, cannot check plan limit"
            );
            return Admission::Unidentified;
        }

        let plan = match self.resolve_plan(eth_address, ip_address, request).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    mode,
                    method,
                    error = %e,
                    "Could not resolve spending plan, limiting request"
                );
                return Admission::Unresolved {
                    error: e.to_string(),
                };
            }
        };

        let limit = self.config.limit_for(plan.subscription_tier);
        let projected = plan.amount_spent.saturating_add(estimated_fee);
        if plan.amount_spent >= limit || projected > limit {
            tracing::info!(
                request_id = %request.request_id,
                mode,
                method,
                plan_id = %plan.id,
                tier = %plan.subscription_tier,
                amount_spent = plan.amount_spent,
                estimated_fee,
                limit,
                "Spending plan limit reached, limiting request"
            );
            return Admission::PlanLimitExceeded {
                plan_id: plan.id,
                tier: plan.subscription_tier,
                amount_spent: plan.amount_spent,
                limit,
            };
        }

        tracing::trace!(
            request_id = %request.request_id,
            mode,
            method,
            plan_id = %plan.id,
            amount_spent = plan.amount_spent,
            limit,
            "Request admitted"
        );
        Admission::Allowed {
            plan_id: plan.id,
            tier: plan.subscription_tier,
        }
    }

    /// Record `cost` against the caller's plan and the global budget.
    ///
    /// # Errors
    ///
    /// Returns `LimiterError::NegativeCost` for a negative `cost`,
    /// `LimiterError::MissingIdentity` if neither an eth address nor an ip
    /// address is known, and `LimiterError::Store` if the plan could not be
    /// resolved or updated.
    pub async fn add_expense(
        &self,
        cost: i64,
        eth_address: Option<&str>,
        request: &RequestDetails,
    ) -> Result<(), LimiterError> {
        if cost < 0 {
            return Err(LimiterError::NegativeCost(cost));
        }
        let eth_address = non_empty(eth_address);
        let ip_address = request.ip_address();
        if eth_address.is_none() && ip_address.is_none() {
            return Err(LimiterError::MissingIdentity);
        }

        let mut plan = self.resolve_plan(eth_address, ip_address, request).await?;
        let amount_spent = match self
            .stores
            .plans
            .add_to_amount_spent(&plan.id, cost, request, self.ad_hoc_ttl())
            .await
        {
            Ok(amount) => amount,
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    request_id = %request.request_id,
                    plan_id = %plan.id,
                    "Spending plan vanished before expense was recorded, re-provisioning"
                );
                plan = self
                    .create_basic_plan(eth_address, ip_address, request)
                    .await?;
                self.stores
                    .plans
                    .add_to_amount_spent(&plan.id, cost, request, self.ad_hoc_ttl())
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        if plan.ad_hoc {
            self.refresh_link(&*self.stores.eth_links, eth_address, &plan.id, request)
                .await;
            self.refresh_link(&*self.stores.ip_links, ip_address, &plan.id, request)
                .await;
        }

        // First expense of the window for this plan.
        if amount_spent == cost {
            metrics::record_unique_plan_use(plan.subscription_tier);
        }

        let remaining = {
            let mut window = self.window();
            // Saturates so a huge cost cannot wrap back to a positive budget.
            window.remaining = window.remaining.saturating_sub(cost);
            window.remaining
        };
        metrics::set_remaining_budget(remaining);

        tracing::debug!(
            request_id = %request.request_id,
            plan_id = %plan.id,
            tier = %plan.subscription_tier,
            cost,
            amount_spent,
            remaining,
            "Recorded expense"
        );

        tokio::spawn(update_average_usage(
            Arc::clone(&self.stores.plans),
            plan.subscription_tier,
            request.clone(),
        ));

        Ok(())
    }

    /// Roll the window over if its reset instant has passed. Returns whether
    /// a reset ran.
    pub async fn roll_over_if_due(&self, request: &RequestDetails) -> Result<bool, LimiterError> {
        if !self.is_reset_due() {
            return Ok(false);
        }
        self.reset_limiter(request).await?;
        Ok(true)
    }

    /// Zero every plan's spend, restore the global budget and move the reset
    /// instant to the next window boundary after now.
    ///
    /// Running it twice in a row is harmless: the second run finds nothing to
    /// zero and leaves the reset instant where the first one put it.
    pub async fn reset_limiter(&self, request: &RequestDetails) -> Result<(), LimiterError> {
        self.stores
            .plans
            .reset_amount_spent_of_all_plans(request)
            .await?;

        let now = self.now();
        let interval = interval_delta(&self.config);
        let window = {
            let mut window = self.window();
            window.remaining = self.config.total_budget;
            window.reset_at = schedule::next_reset(window.reset_at, now, interval);
            *window
        };
        metrics::reset_daily_metrics(window.remaining);

        tracing::info!(
            request_id = %request.request_id,
            remaining = window.remaining,
            next_reset = %window.reset_at,
            "Spend limiter reset"
        );
        Ok(())
    }

    /// Find the caller's plan by eth address, then by ip address, creating a
    /// BASIC plan if neither is linked. A lookup that fails for a reason
    /// other than "not found" still lets the other address be tried, but
    /// never leads to a new plan: that could shadow a configured one.
    async fn resolve_plan(
        &self,
        eth_address: Option<&str>,
        ip_address: Option<&str>,
        request: &RequestDetails,
    ) -> Result<SpendingPlan, StoreError> {
        let mut failure = None;

        if let Some(address) = eth_address {
            match self
                .find_plan_by_address(&*self.stores.eth_links, address, request)
                .await
            {
                Ok(plan) => return Ok(plan),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(
                        request_id = %request.request_id,
                        address,
                        error = %e,
                        "Failed to get spending plan by eth address"
                    );
                    failure = Some(e);
                }
            }
        }

        if let Some(address) = ip_address {
            match self
                .find_plan_by_address(&*self.stores.ip_links, address, request)
                .await
            {
                Ok(plan) => return Ok(plan),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(
                        request_id = %request.request_id,
                        error = %e,
                        "Failed to get spending plan by ip address"
                    );
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        self.create_basic_plan(eth_address, ip_address, request).await
    }

    async fn find_plan_by_address<K: AddressKind>(
        &self,
        links: &AddressPlanStore<K>,
        address: &str,
        request: &RequestDetails,
    ) -> Result<SpendingPlan, StoreError> {
        let link = links.find_by_address(address, request).await?;
        self.stores.plans.find_by_id(&link.plan_id, request).await
    }

    /// Create a BASIC plan and link the caller's addresses to it.
    ///
    /// Links are written with a conditional write. If a concurrent request
    /// linked the address first, its plan is adopted and the plan created
    /// here is deleted again.
    async fn create_basic_plan(
        &self,
        eth_address: Option<&str>,
        ip_address: Option<&str>,
        request: &RequestDetails,
    ) -> Result<SpendingPlan, StoreError> {
        let created = self
            .stores
            .plans
            .create(SubscriptionTier::Basic, self.ad_hoc_ttl(), None, request)
            .await?;
        let mut plan = created.clone();
        let mut created_linked = false;

        if let Some(address) = eth_address {
            match self
                .claim_link(&*self.stores.eth_links, address, &plan.id, request)
                .await?
            {
                None => created_linked = true,
                Some(existing) => plan = existing,
            }
        }

        if let Some(address) = ip_address {
            match self
                .claim_link(&*self.stores.ip_links, address, &plan.id, request)
                .await?
            {
                None if plan.id == created.id => created_linked = true,
                Some(existing) if !created_linked => plan = existing,
                _ => {}
            }
        }

        if created_linked {
            tracing::info!(
                request_id = %request.request_id,
                plan_id = %created.id,
                eth_address = eth_address.unwrap_or_default(),
                linked_ip_address = ip_address.is_some(),
                "Created basic spending plan"
            );
        } else {
            tracing::debug!(
                request_id = %request.request_id,
                plan_id = %created.id,
                adopted_plan_id = %plan.id,
                "Address already linked by a concurrent request, discarding new plan"
            );
            discard_plan(&self.stores.plans, &created.id, request).await;
        }

        Ok(plan)
    }

    /// Link `address` to `plan_id` unless a live plan already holds it.
    /// Returns that plan if so. Links left behind by expired plans are
    /// overwritten.
    async fn claim_link<K: AddressKind>(
        &self,
        links: &AddressPlanStore<K>,
        address: &str,
        plan_id: &str,
        request: &RequestDetails,
    ) -> Result<Option<SpendingPlan>, StoreError> {
        let link = AddressPlanLink::new(address, plan_id);
        let ttl = self.ad_hoc_ttl();
        if links.save_if_absent(&link, request, ttl).await? {
            return Ok(None);
        }

        let existing = match links.find_by_address(address, request).await {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => {
                links.save(&link, request, ttl).await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if existing.plan_id == plan_id {
            return Ok(None);
        }

        match self.stores.plans.find_by_id(&existing.plan_id, request).await {
            Ok(plan) => Ok(Some(plan)),
            Err(e) if e.is_not_found() => {
                tracing::debug!(
                    request_id = %request.request_id,
                    kind = links.kind(),
                    stale_plan_id = %existing.plan_id,
                    "Replacing link to expired spending plan"
                );
                links.save(&link, request, ttl).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Push back the expiry of the caller's link to an ad hoc plan. A link
    /// that points elsewhere is left alone. Failures are logged, not returned.
    async fn refresh_link<K: AddressKind>(
        &self,
        links: &AddressPlanStore<K>,
        address: Option<&str>,
        plan_id: &str,
        request: &RequestDetails,
    ) {
        let Some(address) = address else {
            return;
        };
        let result = match links.find_by_address(address, request).await {
            Ok(link) if link.plan_id == plan_id => {
                links.save(&link, request, self.ad_hoc_ttl()).await
            }
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(
                request_id = %request.request_id,
                kind = links.kind(),
                plan_id,
                error = %e,
                "Failed to refresh address spending plan link"
            );
        }
    }

    /// Ad hoc plans and their links live for one reset window past their
    /// last expense.
    fn ad_hoc_ttl(&self) -> Ttl {
        Ttl::After(self.config.reset_interval())
    }

    fn window(&self) -> MutexGuard<'_, BudgetWindow> {
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn discard_plan(plans: &SpendingPlanStore, plan_id: &str, request: &RequestDetails) {
    if let Err(e) = plans.delete(plan_id, request).await {
        tracing::warn!(
            request_id = %request.request_id,
            plan_id,
            error = %e,
            "Failed to delete unused spending plan, leaving it to expire"
        );
    }
}

/// Recompute the mean spend of active plans in `tier` and publish it.
async fn update_average_usage(
    plans: Arc<SpendingPlanStore>,
    tier: SubscriptionTier,
    request: RequestDetails,
) {
    match plans
        .find_all_active_by_subscription_tier(tier, &request)
        .await
    {
        Ok(active) if active.is_empty() => {}
        Ok(active) => {
            let total: f64 = active.iter().map(|plan| plan.amount_spent as f64).sum();
            let average = total / active.len() as f64;
            metrics::set_average_usage(tier, average);
        }
        Err(e) => {
            tracing::warn!(
                request_id = %request.request_id,
                tier = %tier,
                error = %e,
                "Failed to update average spending plan usage"
            );
        }
    }
}

fn interval_delta(config: &LimiterConfig) -> TimeDelta {
    TimeDelta::seconds(config.reset_interval_secs as i64)
}

fn non_empty(address: Option<&str>) -> Option<&str> {
    address.filter(|a| !a.is_empty())
}
