//! Shared cache abstraction.
//!
//! Every store in this crate persists through the [`Cache`] trait: a single
//! logical key-value namespace with per-key expiry. Keys follow the
//! `<collection>:<identifier>` convention and values are JSON documents.
//!
//! Stores never talk to a backend directly. They go through [`CacheClient`],
//! which bounds every call with the configured operation timeout, converts
//! values to and from their typed form, and records operation metrics.

mod error;
mod memory;
#[cfg(any(test, feature = "test-util"))]
mod recording;

pub use error::CacheError;
pub use memory::InMemoryCache;
#[cfg(any(test, feature = "test-util"))]
pub use recording::{CacheOperation, RecordingCache};

use crate::request::RequestDetails;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Expiry policy for a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Entry is dropped once the duration has elapsed since the last write.
    After(Duration),
    /// Entry never expires (preconfigured plans and their links).
    Forever,
}

impl Ttl {
    pub fn from_secs(secs: u64) -> Self {
        Ttl::After(Duration::from_secs(secs))
    }

    /// Deadline for an entry written at `now`, `None` for [`Ttl::Forever`].
    pub fn deadline(&self, now: Instant) -> Option<Instant> {
        match self {
            Ttl::After(duration) => Some(now + *duration),
            Ttl::Forever => None,
        }
    }
}

/// Backend contract consumed by every store.
///
/// `op` is a short label of the store operation that issued the call
/// (`"findByAddress"`, `"save"`, ...). It is used for logging and metrics only.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    /// Backend name for logs (`"memory"`, `"redis"`, ...).
    fn name(&self) -> &'static str;

    async fn get(
        &self,
        key: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<Option<Value>, CacheError>;

    async fn set(
        &self,
        key: &str,
        value: Value,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<(), CacheError>;

    /// Write `value` only if `key` holds no live entry. Returns whether the
    /// write happened.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str, op: &str, request: &RequestDetails)
        -> Result<(), CacheError>;

    /// Atomically add `delta` to the integer at `key` (missing counts as 0)
    /// and return the new value.
    async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<i64, CacheError>;

    /// Append `value` to the list at `key`, creating it if missing.
    async fn rpush(
        &self,
        key: &str,
        value: Value,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<(), CacheError>;

    /// Live keys matching a glob pattern such as `spendingPlan:*`.
    async fn keys(
        &self,
        pattern: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<Vec<String>, CacheError>;

    async fn clear(&self, request: &RequestDetails) -> Result<(), CacheError>;
}

/// Typed, deadline-bounded handle on a shared [`Cache`].
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<dyn Cache>,
    timeout: Duration,
}

impl CacheClient {
    pub fn new(inner: Arc<dyn Cache>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.name()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<Option<T>, CacheError> {
        let value = self.bounded(op, self.inner.get(key, op, request)).await?;
        value.map(|v| decode(key, v)).transpose()
    }

    pub async fn exists(
        &self,
        key: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<bool, CacheError> {
        let value = self.bounded(op, self.inner.get(key, op, request)).await?;
        Ok(value.is_some())
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<(), CacheError> {
        let value = encode(key, value)?;
        self.bounded(op, self.inner.set(key, value, op, request, ttl))
            .await
    }

    pub async fn set_if_absent<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<bool, CacheError> {
        let value = encode(key, value)?;
        self.bounded(op, self.inner.set_if_absent(key, value, op, request, ttl))
            .await
    }

    pub async fn delete(
        &self,
        key: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<(), CacheError> {
        self.bounded(op, self.inner.delete(key, op, request)).await
    }

    pub async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<i64, CacheError> {
        self.bounded(op, self.inner.incr_by(key, delta, op, request, ttl))
            .await
    }

    pub async fn rpush<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<(), CacheError> {
        let value = encode(key, value)?;
        self.bounded(op, self.inner.rpush(key, value, op, request, ttl))
            .await
    }

    pub async fn keys(
        &self,
        pattern: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<Vec<String>, CacheError> {
        self.bounded(op, self.inner.keys(pattern, op, request)).await
    }

    pub async fn clear(&self, request: &RequestDetails) -> Result<(), CacheError> {
        self.bounded("clear", self.inner.clear(request)).await
    }

    /// Run a backend call under the operation deadline. A timed-out call is
    /// reported as [`CacheError::Timeout`]; the backend future is dropped.
    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                operation: op.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(CacheError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        crate::metrics::record_cache_operation(op, outcome);

        if let Err(e) = &result {
            tracing::debug!(
                backend = self.inner.name(),
                operation = op,
                error = %e,
                "Cache operation failed"
            );
        }

        result
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Value, CacheError> {
    serde_json::to_value(value).map_err(|source| CacheError::Serialization {
        key: key.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, CacheError> {
    serde_json::from_value(value).map_err(|source| CacheError::Serialization {
        key: key.to_string(),
        source,
    })
}
