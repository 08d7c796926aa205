//! Shared test utilities for Tollgate integration tests.
//!
//! Builds stores, limiters and routers over an in-memory cache wrapped in a
//! write recorder, so tests can assert on the writes a call made.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tollgate::api::{create_router, AppState};
use tollgate::cache::{CacheClient, InMemoryCache, RecordingCache};
use tollgate::config::{LimiterConfig, TierLimits, TollgateConfig};
use tollgate::limiter::SpendLimiter;
use tollgate::reconciler::SpendingPlanConfig;
use tollgate::request::RequestDetails;
use tollgate::store::PlanStores;

/// Budget used by [`small_config`]
pub const TOTAL_BUDGET: i64 = 1_000;
pub const BASIC_LIMIT: i64 = 100;
pub const EXTENDED_LIMIT: i64 = 300;
pub const PRIVILEGED_LIMIT: i64 = 900;

/// Stores over a recording in-memory cache.
pub struct TestStores {
    pub stores: PlanStores,
    pub cache: Arc<RecordingCache>,
}

pub fn make_stores() -> TestStores {
    let cache = Arc::new(RecordingCache::new(Arc::new(InMemoryCache::new())));
    let client = CacheClient::new(cache.clone(), Duration::from_secs(1));
    TestStores {
        stores: PlanStores::new(client),
        cache,
    }
}

/// Limiter config with small numbers that are easy to reason about.
pub fn small_config() -> LimiterConfig {
    LimiterConfig {
        total_budget: TOTAL_BUDGET,
        reset_interval_secs: 86_400,
        tier_limits: TierLimits {
            basic: BASIC_LIMIT,
            extended: EXTENDED_LIMIT,
            privileged: PRIVILEGED_LIMIT,
        },
    }
}

pub fn make_limiter(stores: &PlanStores) -> Arc<SpendLimiter> {
    Arc::new(SpendLimiter::new(stores.clone(), small_config()))
}

/// Router over a fresh limiter, returned with the stores behind it.
pub fn make_app() -> (axum::Router, TestStores, Arc<SpendLimiter>) {
    let test_stores = make_stores();
    let limiter = make_limiter(&test_stores.stores);
    let mut config = TollgateConfig::default();
    config.limiter = small_config();
    let state = Arc::new(AppState::new(
        Arc::clone(&limiter),
        test_stores.stores.clone(),
        Arc::new(config),
    ));
    (create_router(state), test_stores, limiter)
}

pub fn internal_request() -> RequestDetails {
    RequestDetails::internal("integration-test")
}

pub fn from_ip(ip: &str) -> RequestDetails {
    RequestDetails::new("integration-test", Some(ip.to_string()))
}

/// Parse a declaration written as JSON.
pub fn declared(json: serde_json::Value) -> Vec<SpendingPlanConfig> {
    serde_json::from_value(json).expect("valid spending plan declaration")
}
