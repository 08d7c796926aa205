//! Tollgate - spend limiting for a JSON-RPC ledger relay
//!
//! This library decides whether a relay call may spend network fees,
//! attributes spend to per-caller spending plans, and keeps operator-declared
//! plans in sync with the shared cache.

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod limiter;
pub mod logging;
pub mod metrics;
pub mod reconciler;
pub mod request;
pub mod store;
