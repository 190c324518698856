//! Bounded connection pool around a collaborator
//!
//! Every call checks out one of `max_connections` permits for its whole
//! duration and returns it on completion, success or not. After `close()`
//! every call fails with `SourceUnavailable`.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info};

use panelx_core::{
    AttributeStore, Condition, Error, PanelId, PanelIdSet, PanelRecord, Result, VectorHit, VectorIndex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub max_connections: usize,
    pub in_use: usize,
    pub available: usize,
    pub closed: bool,
}

pub struct Pooled<S: ?Sized> {
    name: String,
    inner: Arc<S>,
    permits: Semaphore,
    max_connections: usize,
    closed: AtomicBool,
}

impl<S: ?Sized> Pooled<S> {
    pub fn open(name: impl Into<String>, inner: Arc<S>, max_connections: usize) -> Result<Self> {
        let name = name.into();
        if max_connections == 0 {
            return Err(Error::InvalidConfig(format!("pool '{name}' needs at least one connection")));
        }
        info!(pool = %name, max_connections, "Connection pool opened");
        Ok(Self {
            name,
            inner,
            permits: Semaphore::new(max_connections),
            max_connections,
            closed: AtomicBool::new(false),
        })
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let available = if self.is_closed() {
            0
        } else {
            self.permits.available_permits()
        };
        PoolStats {
            max_connections: self.max_connections,
            in_use: self.max_connections.saturating_sub(self.permits.available_permits()),
            available,
            closed: self.is_closed(),
        }
    }

    /// Idempotent; waiters blocked on a checkout fail immediately
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.permits.close();
            info!(pool = %self.name, "Connection pool closed");
        }
    }

    async fn checkout(&self) -> Result<SemaphorePermit<'_>> {
        if self.is_closed() {
            return Err(Error::unavailable(&self.name, "pool closed"));
        }
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::unavailable(&self.name, "pool closed"))?;
        debug!(pool = %self.name, available = self.permits.available_permits(), "Connection checked out");
        Ok(permit)
    }
}

#[async_trait]
impl<S: AttributeStore + ?Sized> AttributeStore for Pooled<S> {
    async fn query_by_predicates(&self, predicate: &Condition) -> Result<PanelIdSet> {
        let _conn = self.checkout().await?;
        self.inner.query_by_predicates(predicate).await
    }

    async fn fetch_by_ids(&self, ids: &[PanelId]) -> Result<Vec<PanelRecord>> {
        let _conn = self.checkout().await?;
        self.inner.fetch_by_ids(ids).await
    }

    fn close(&self) {
        self.shutdown();
        self.inner.close();
    }
}

#[async_trait]
impl<S: VectorIndex + ?Sized> VectorIndex for Pooled<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(
        &self,
        vector: &[f32],
        filter_ids: Option<&PanelIdSet>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<VectorHit>> {
        let _conn = self.checkout().await?;
        self.inner.search(vector, filter_ids, top_k, score_threshold).await
    }

    fn close(&self) {
        self.shutdown();
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAttributeStore;

    fn pooled() -> Pooled<MemoryAttributeStore> {
        let store = MemoryAttributeStore::with_records(vec![PanelRecord::new("a").with("gender", "F")]);
        Pooled::open("attributes", Arc::new(store), 2).unwrap()
    }

    #[tokio::test]
    async fn test_calls_return_connections() {
        let pool = pooled();
        let ids = pool
            .query_by_predicates(&Condition::Equals { field: "gender".into(), value: "F".into() })
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(
            pool.stats(),
            PoolStats { max_connections: 2, in_use: 0, available: 2, closed: false }
        );
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let pool = pooled();
        AttributeStore::close(&pool);
        let err = pool.fetch_by_ids(&[PanelId::new("a")]).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
        assert!(pool.stats().closed);
        assert_eq!(pool.stats().available, 0);
    }

    #[test]
    fn test_zero_connections_rejected() {
        let store = Arc::new(MemoryAttributeStore::new());
        assert!(Pooled::open("attributes", store, 0).is_err());
    }
}
