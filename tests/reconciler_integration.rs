//! Integration tests for declared spending plan reconciliation.

mod common;

use common::{declared, from_ip, internal_request, make_limiter, make_stores};
use serde_json::json;
use tollgate::limiter::Admission;
use tollgate::reconciler::{PlanReconciler, ReconcileError};
use tollgate::store::SubscriptionTier;

fn partner_plans() -> serde_json::Value {
    json!([
        {
            "id": "partner-1",
            "name": "Partner One",
            "subscriptionTier": "EXTENDED",
            "ethAddresses": ["0xaaa", "0xbbb"],
            "ipAddresses": ["10.0.0.1"]
        },
        {
            "id": "operator",
            "name": "Operator",
            "subscriptionTier": "PRIVILEGED",
            "ipAddresses": ["10.0.0.2"]
        }
    ])
}

#[tokio::test]
async fn test_second_run_writes_nothing() {
    let t = make_stores();
    let reconciler = PlanReconciler::new(t.stores.clone());
    let configs = declared(partner_plans());

    let first = reconciler.reconcile(&configs).await.unwrap();
    assert_eq!(first.to_create.len(), 2);
    assert!(t.cache.write_count() > 0);

    t.cache.reset();
    let second = reconciler.reconcile(&configs).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(t.cache.write_count(), 0, "writes: {:?}", t.cache.writes());
}

#[tokio::test]
async fn test_converges_after_declaration_change() {
    let t = make_stores();
    let reconciler = PlanReconciler::new(t.stores.clone());
    reconciler
        .reconcile(&declared(partner_plans()))
        .await
        .unwrap();

    // partner-1 drops 0xbbb and the ip, operator is removed, a new plan appears
    let changed = declared(json!([
        {
            "id": "partner-1",
            "name": "Partner One",
            "subscriptionTier": "EXTENDED",
            "ethAddresses": ["0xaaa"]
        },
        {
            "id": "partner-2",
            "name": "Partner Two",
            "subscriptionTier": "PRIVILEGED",
            "ethAddresses": ["0xbbb"],
            "ipAddresses": ["10.0.0.2"]
        }
    ]));
    reconciler.reconcile(&changed).await.unwrap();

    let request = internal_request();
    let mut plan_ids: Vec<String> = t
        .stores
        .plans
        .find_all(&request)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    plan_ids.sort();
    assert_eq!(plan_ids, vec!["partner-1", "partner-2"]);

    let eth: Vec<(String, String)> = t
        .stores
        .eth_links
        .find_all(&request)
        .await
        .unwrap()
        .into_iter()
        .map(|l| (l.address, l.plan_id))
        .collect();
    assert_eq!(
        eth,
        vec![
            ("0xaaa".to_string(), "partner-1".to_string()),
            ("0xbbb".to_string(), "partner-2".to_string()),
        ]
    );

    let ip: Vec<(String, String)> = t
        .stores
        .ip_links
        .find_all(&request)
        .await
        .unwrap()
        .into_iter()
        .map(|l| (l.address, l.plan_id))
        .collect();
    assert_eq!(ip, vec![("10.0.0.2".to_string(), "partner-2".to_string())]);

    t.cache.reset();
    assert!(reconciler.reconcile(&changed).await.unwrap().is_empty());
    assert_eq!(t.cache.write_count(), 0);
}

#[tokio::test]
async fn test_auto_provisioned_caller_moves_to_declared_plan() {
    let t = make_stores();
    let limiter = make_limiter(&t.stores);
    let request = from_ip("192.168.1.7");

    limiter
        .add_expense(40, Some("0xabc"), &request)
        .await
        .unwrap();
    let basic = t
        .stores
        .eth_links
        .find_by_address("0xabc", &internal_request())
        .await
        .unwrap()
        .plan_id;

    PlanReconciler::new(t.stores.clone())
        .reconcile(&declared(json!([{
            "id": "p1",
            "name": "Promoted",
            "subscriptionTier": "EXTENDED",
            "ethAddresses": ["0xabc"]
        }])))
        .await
        .unwrap();

    let admission = limiter
        .admit("test", "eth_sendRawTransaction", Some("0xabc"), &request, 0)
        .await;
    assert_eq!(
        admission,
        Admission::Allowed {
            plan_id: "p1".to_string(),
            tier: SubscriptionTier::Extended,
        }
    );

    // The BASIC plan is not the reconciler's to delete
    let old = t
        .stores
        .plans
        .find_by_id(&basic, &internal_request())
        .await
        .unwrap();
    assert_eq!(old.subscription_tier, SubscriptionTier::Basic);
    assert_eq!(old.amount_spent, 40);
}

#[tokio::test]
async fn test_entry_without_tier_aborts_before_writing() {
    let t = make_stores();
    let result = PlanReconciler::new(t.stores.clone())
        .reconcile(&declared(json!([
            {"id": "ok", "name": "ok", "subscriptionTier": "BASIC", "ethAddresses": ["0x1"]},
            {"id": "no-tier", "name": "no tier", "ethAddresses": ["0x2"]}
        ])))
        .await;

    match result {
        Err(ReconcileError::InvalidConfiguration { entry, reason }) => {
            assert_eq!(reason, "missing subscriptionTier");
            assert!(entry.contains("no-tier"));
        }
        other => panic!("expected invalid configuration, got {:?}", other),
    }
    assert_eq!(t.cache.write_count(), 0);
}

#[tokio::test]
async fn test_declared_plan_limits_use_declared_tier() {
    let t = make_stores();
    let limiter = make_limiter(&t.stores);
    PlanReconciler::new(t.stores.clone())
        .reconcile(&declared(partner_plans()))
        .await
        .unwrap();

    let request = from_ip("10.0.0.2");
    limiter.add_expense(850, None, &request).await.unwrap();

    let plan = t
        .stores
        .plans
        .find_by_id("operator", &internal_request())
        .await
        .unwrap();
    assert_eq!(plan.amount_spent, 850);

    // 850 + 60 passes the PRIVILEGED ceiling of 900
    let admission = limiter
        .admit("test", "eth_sendRawTransaction", None, &request, 60)
        .await;
    assert!(matches!(admission, Admission::PlanLimitExceeded { limit: 900, .. }));
}

#[tokio::test]
async fn test_store_failure_is_reported() {
    let t = make_stores();
    t.cache.set_unavailable(true);
    let result = PlanReconciler::new(t.stores.clone())
        .reconcile(&declared(partner_plans()))
        .await;
    assert!(matches!(result, Err(ReconcileError::Store(_))));
}
