//! Output formatting helpers for CLI commands

use crate::reconciler::DeclaredPlan;
use crate::store::SubscriptionTier;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::json;

/// View model for a declared plan
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanView {
    pub id: String,
    pub name: String,
    pub subscription_tier: SubscriptionTier,
    pub eth_addresses: Vec<String>,
    pub ip_addresses: Vec<String>,
}

impl From<&DeclaredPlan> for PlanView {
    fn from(plan: &DeclaredPlan) -> Self {
        Self {
            id: plan.id.clone(),
            name: plan.name.clone(),
            subscription_tier: plan.tier,
            eth_addresses: plan.eth_addresses.clone(),
            ip_addresses: plan.ip_addresses.clone(),
        }
    }
}

/// Format declared plans as a table
pub fn format_plans_table(plans: &[PlanView]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Name", "Tier", "ETH Addresses", "IP Addresses"]);

    for p in plans {
        table.add_row(vec![
            Cell::new(&p.id),
            Cell::new(&p.name),
            Cell::new(tier_label(p.subscription_tier)),
            Cell::new(p.eth_addresses.len()),
            Cell::new(p.ip_addresses.len()),
        ]);
    }

    table.to_string()
}

/// Format declared plans as JSON
pub fn format_plans_json(plans: &[PlanView]) -> String {
    format!("{:#}", json!({ "plans": plans }))
}

fn tier_label(tier: SubscriptionTier) -> String {
    match tier {
        SubscriptionTier::Basic => tier.as_str().normal().to_string(),
        SubscriptionTier::Extended => tier.as_str().cyan().to_string(),
        SubscriptionTier::Privileged => tier.as_str().green().to_string(),
    }
}
