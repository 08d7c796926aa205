use crate::store::SubscriptionTier;
use serde::Serialize;

/// Outcome of an admission check, with the reason behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Admission {
    /// The caller's plan has room for the call.
    #[serde(rename_all = "camelCase")]
    Allowed {
        plan_id: String,
        tier: SubscriptionTier,
    },
    /// No address identified the caller, so no plan could be charged.
    Unidentified,
    /// The shared budget is spent, or would be by this call.
    #[serde(rename_all = "camelCase")]
    GlobalBudgetExhausted { remaining: i64, estimated_fee: i64 },
    /// The caller's plan is at or would pass its tier ceiling.
    #[serde(rename_all = "camelCase")]
    PlanLimitExceeded {
        plan_id: String,
        tier: SubscriptionTier,
        amount_spent: i64,
        limit: i64,
    },
    /// The caller's plan could not be looked up because the store failed.
    Unresolved { error: String },
    /// A negative fee was quoted. Nothing is looked up or charged.
    #[serde(rename_all = "camelCase")]
    InvalidFee { estimated_fee: i64 },
}

impl Admission {
    /// Whether the call must be refused. Store failures refuse.
    pub fn is_limited(&self) -> bool {
        !matches!(self, Admission::Allowed { .. } | Admission::Unidentified)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Admission::Allowed { .. } => "allowed",
            Admission::Unidentified => "unidentified",
            Admission::GlobalBudgetExhausted { .. } => "global_budget_exhausted",
            Admission::PlanLimitExceeded { .. } => "plan_limit_exceeded",
            Admission::Unresolved { .. } => "unresolved",
            Admission::InvalidFee { .. } => "invalid_fee",
        }
    }
}
