//! Read-through cache of counts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::platform::cache::CountCache;
use crate::service::{DayCount, Store};

/// Serves `count` from the shared count cache. Writes do not invalidate;
/// cached counts may lag for up to the cache TTL.
pub struct Cached<S> {
    inner: S,
    cache: CountCache,
}

impl<S: Store> Cached<S> {
    pub fn new(inner: S, cache: CountCache) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl<S: Store> Store for Cached<S> {
    type Entity = S::Entity;
    type Query = S::Query;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn put(&self, ns: &str, entity: S::Entity) -> Result<S::Entity> {
        self.inner.put(ns, entity).await
    }

    async fn put_all(&self, ns: &str, entities: Vec<S::Entity>) -> Result<Vec<S::Entity>> {
        self.inner.put_all(ns, entities).await
    }

    async fn query(&self, ns: &str, opts: &S::Query) -> Result<Vec<S::Entity>> {
        self.inner.query(ns, opts).await
    }

    async fn count(&self, ns: &str, opts: &S::Query) -> Result<u64> {
        let key = CountCache::key(ns, self.inner.name(), opts);
        if let Some(count) = self.cache.get(&key) {
            return Ok(count);
        }

        let count = self.inner.count(ns, opts).await?;
        self.cache.insert(key, count);
        Ok(count)
    }

    async fn created_by_day(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DayCount>> {
        self.inner.created_by_day(ns, start, end).await
    }

    async fn setup(&self, ns: &str) -> Result<()> {
        self.inner.setup(ns).await
    }

    async fn teardown(&self, ns: &str) -> Result<()> {
        self.cache.invalidate_namespace(ns);
        self.inner.teardown(ns).await
    }
}
