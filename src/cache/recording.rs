//! Instrumented cache wrapper.
//!
//! Records every mutating call made through it and can be switched into an
//! unavailable or a stalled state. Used to check that reconciliation against
//! an already-converged store writes nothing, and that the limiter behaves
//! when the backend goes away or stops answering.
//!
//! Only built for tests and under the `test-util` feature.

use super::{Cache, CacheError, Ttl};
use crate::request::RequestDetails;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A mutating call observed by [`RecordingCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOperation {
    Set(String),
    SetIfAbsent(String),
    Delete(String),
    IncrBy(String, i64),
    RPush(String),
    Clear,
}

impl CacheOperation {
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheOperation::Set(key)
            | CacheOperation::SetIfAbsent(key)
            | CacheOperation::Delete(key)
            | CacheOperation::IncrBy(key, _)
            | CacheOperation::RPush(key) => Some(key),
            CacheOperation::Clear => None,
        }
    }
}

pub struct RecordingCache {
    inner: Arc<dyn Cache>,
    writes: Mutex<Vec<CacheOperation>>,
    unavailable: AtomicBool,
    stalled: AtomicBool,
}

impl RecordingCache {
    pub fn new(inner: Arc<dyn Cache>) -> Self {
        Self {
            inner,
            writes: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
        }
    }

    /// Mutating calls seen since creation or the last [`reset`](Self::reset).
    pub fn writes(&self) -> Vec<CacheOperation> {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn reset(&self) {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// While set, every call fails with [`CacheError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// While set, every call hangs until the caller gives up on it.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    async fn check(&self) -> Result<(), CacheError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(
                "backend switched off".to_string(),
            ));
        }
        Ok(())
    }

    fn record(&self, operation: CacheOperation) {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(operation);
    }
}

#[async_trait]
impl Cache for RecordingCache {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get(
        &self,
        key: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<Option<Value>, CacheError> {
        self.check().await?;
        self.inner.get(key, op, request).await
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<(), CacheError> {
        self.check().await?;
        self.record(CacheOperation::Set(key.to_string()));
        self.inner.set(key, value, op, request, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<bool, CacheError> {
        self.check().await?;
        self.record(CacheOperation::SetIfAbsent(key.to_string()));
        self.inner.set_if_absent(key, value, op, request, ttl).await
    }

    async fn delete(
        &self,
        key: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<(), CacheError> {
        self.check().await?;
        self.record(CacheOperation::Delete(key.to_string()));
        self.inner.delete(key, op, request).await
    }

    async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<i64, CacheError> {
        self.check().await?;
        self.record(CacheOperation::IncrBy(key.to_string(), delta));
        self.inner.incr_by(key, delta, op, request, ttl).await
    }

    async fn rpush(
        &self,
        key: &str,
        value: Value,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<(), CacheError> {
        self.check().await?;
        self.record(CacheOperation::RPush(key.to_string()));
        self.inner.rpush(key, value, op, request, ttl).await
    }

    async fn keys(
        &self,
        pattern: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<Vec<String>, CacheError> {
        self.check().await?;
        self.inner.keys(pattern, op, request).await
    }

    async fn clear(&self, request: &RequestDetails) -> Result<(), CacheError> {
        self.check().await?;
        self.record(CacheOperation::Clear);
        self.inner.clear(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    #[tokio::test]
    async fn records_writes_but_not_reads() {
        let cache = RecordingCache::new(Arc::new(InMemoryCache::new()));
        let request = RequestDetails::default();

        cache
            .set("a", Value::from(1), "save", &request, Ttl::Forever)
            .await
            .unwrap();
        cache.get("a", "find", &request).await.unwrap();
        cache.delete("a", "delete", &request).await.unwrap();

        assert_eq!(
            cache.writes(),
            vec![
                CacheOperation::Set("a".to_string()),
                CacheOperation::Delete("a".to_string()),
            ]
        );
        cache.reset();
        assert_eq!(cache.write_count(), 0);
    }

    #[tokio::test]
    async fn unavailable_fails_every_call() {
        let cache = RecordingCache::new(Arc::new(InMemoryCache::new()));
        let request = RequestDetails::default();
        cache.set_unavailable(true);

        assert!(matches!(
            cache.get("a", "find", &request).await,
            Err(CacheError::Unavailable(_))
        ));
        assert_eq!(cache.write_count(), 0);

        cache.set_unavailable(false);
        assert!(cache.get("a", "find", &request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stalled_calls_never_complete() {
        let cache = RecordingCache::new(Arc::new(InMemoryCache::new()));
        let request = RequestDetails::default();
        cache.set_stalled(true);

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            cache.set("a", Value::from(1), "save", &request, Ttl::Forever),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(cache.write_count(), 0);
    }
}
