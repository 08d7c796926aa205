//! Pure difference between stored state and the declared plan list.

use super::DeclaredPlan;
use crate::store::SubscriptionTier;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which link collection an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkKind {
    Eth,
    Ip,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Eth => f.write_str("eth"),
            LinkKind::Ip => f.write_str("ip"),
        }
    }
}

/// Snapshot of the stores taken before reconciling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    /// Plan id to tier
    pub plans: BTreeMap<String, SubscriptionTier>,
    /// Eth address to plan id
    pub eth_links: BTreeMap<String, String>,
    /// Ip address to plan id
    pub ip_links: BTreeMap<String, String>,
}

impl ObservedState {
    fn links(&self, kind: LinkKind) -> &BTreeMap<String, String> {
        match kind {
            LinkKind::Eth => &self.eth_links,
            LinkKind::Ip => &self.ip_links,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCreation {
    pub id: String,
    pub name: String,
    pub tier: SubscriptionTier,
}

/// Point `address` at `plan_id`, replacing the link to `previous` if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relink {
    pub kind: LinkKind,
    pub address: String,
    pub plan_id: String,
    pub previous: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRemoval {
    pub kind: LinkKind,
    pub address: String,
    pub plan_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRemoval {
    pub id: String,
    pub tier: SubscriptionTier,
}

/// A declared plan that already exists with another tier. Tiers never
/// change after creation, so this is reported and left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConflict {
    pub id: String,
    pub declared: SubscriptionTier,
    pub stored: SubscriptionTier,
}

/// Writes needed to bring the stores in line with the declaration, in the
/// order they must be applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_create: Vec<PlanCreation>,
    pub to_relink: Vec<Relink>,
    pub to_delete_links: Vec<LinkRemoval>,
    pub to_delete_plans: Vec<PlanRemoval>,
    pub tier_conflicts: Vec<TierConflict>,
}

impl ReconcilePlan {
    /// Whether applying the plan writes nothing.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty()
            && self.to_relink.is_empty()
            && self.to_delete_links.is_empty()
            && self.to_delete_plans.is_empty()
    }
}

/// Compute the writes that make `observed` match `declared`.
///
/// - Declared plans missing from the store are created.
/// - Each declared address is linked to its plan unless it already is. An
///   address declared under several plans goes to the first one.
/// - A link pointing at a declared plan is removed when its address is no
///   longer declared anywhere.
/// - Undeclared plans are removed with all their links, except BASIC plans,
///   which belong to callers the limiter provisioned on first contact.
pub fn diff(observed: &ObservedState, declared: &[DeclaredPlan]) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for declared_plan in declared {
        match observed.plans.get(&declared_plan.id) {
            None => plan.to_create.push(PlanCreation {
                id: declared_plan.id.clone(),
                name: declared_plan.name.clone(),
                tier: declared_plan.tier,
            }),
            Some(&stored) if stored != declared_plan.tier => {
                plan.tier_conflicts.push(TierConflict {
                    id: declared_plan.id.clone(),
                    declared: declared_plan.tier,
                    stored,
                })
            }
            Some(_) => {}
        }
    }

    let declared_ids: BTreeSet<&str> = declared.iter().map(|p| p.id.as_str()).collect();

    for kind in [LinkKind::Eth, LinkKind::Ip] {
        let wanted = declared_links(declared, kind);
        let current = observed.links(kind);

        for (address, plan_id) in &wanted {
            let previous = current.get(*address);
            if previous.map(String::as_str) != Some(*plan_id) {
                plan.to_relink.push(Relink {
                    kind,
                    address: address.to_string(),
                    plan_id: plan_id.to_string(),
                    previous: previous.cloned(),
                });
            }
        }

        for (address, plan_id) in current {
            if declared_ids.contains(plan_id.as_str()) && !wanted.contains_key(address.as_str()) {
                plan.to_delete_links.push(LinkRemoval {
                    kind,
                    address: address.clone(),
                    plan_id: plan_id.clone(),
                });
            }
        }
    }

    for (id, &tier) in &observed.plans {
        if tier != SubscriptionTier::Basic && !declared_ids.contains(id.as_str()) {
            plan.to_delete_plans.push(PlanRemoval {
                id: id.clone(),
                tier,
            });
        }
    }

    plan
}

/// Address to plan id for one link kind. The first declaration of an
/// address wins.
fn declared_links(declared: &[DeclaredPlan], kind: LinkKind) -> BTreeMap<&str, &str> {
    let mut links = BTreeMap::new();
    for plan in declared {
        let addresses = match kind {
            LinkKind::Eth => &plan.eth_addresses,
            LinkKind::Ip => &plan.ip_addresses,
        };
        for address in addresses {
            links.entry(address.as_str()).or_insert(plan.id.as_str());
        }
    }
    links
}
