//! Propagation of successful writes to a change source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::service::{DayCount, Identity, Source, Store};

/// Publishes `{old, new}` after every successful `put` or `put_all` of the
/// inner store.
///
/// The write happens before the publish, so a consumer always finds `new`
/// in storage. A failed publish is logged and does not fail the write.
pub struct Sourced<S: Store> {
    inner: S,
    source: Arc<dyn Source<S::Entity>>,
}

impl<S: Store> Sourced<S> {
    pub fn new(inner: S, source: Arc<dyn Source<S::Entity>>) -> Self {
        Self { inner, source }
    }
}

impl<S> Sourced<S>
where
    S: Store,
    S::Entity: Identity<Query = S::Query>,
{
    async fn stored(&self, ns: &str, entity: &S::Entity) -> Result<Option<S::Entity>> {
        match entity.identity() {
            Some(opts) => Ok(self.inner.query(ns, &opts).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn propagate(&self, ns: &str, old: Option<&S::Entity>, new: &S::Entity) {
        if let Err(err) = self.source.propagate(ns, old, new).await {
            warn!(
                target: "service",
                service = self.inner.name(),
                namespace = ns,
                error = %err,
                "failed to propagate state change"
            );
        }
    }
}

#[async_trait]
impl<S> Store for Sourced<S>
where
    S: Store,
    S::Entity: Identity<Query = S::Query>,
{
    type Entity = S::Entity;
    type Query = S::Query;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn put(&self, ns: &str, entity: S::Entity) -> Result<S::Entity> {
        let old = self.stored(ns, &entity).await?;
        let new = self.inner.put(ns, entity).await?;
        self.propagate(ns, old.as_ref(), &new).await;
        Ok(new)
    }

    async fn put_all(&self, ns: &str, entities: Vec<S::Entity>) -> Result<Vec<S::Entity>> {
        let mut olds = Vec::with_capacity(entities.len());
        for entity in &entities {
            olds.push(self.stored(ns, entity).await?);
        }

        let stored = self.inner.put_all(ns, entities).await?;

        for (old, new) in olds.iter().zip(&stored) {
            self.propagate(ns, old.as_ref(), new).await;
        }
        Ok(stored)
    }

    async fn query(&self, ns: &str, opts: &S::Query) -> Result<Vec<S::Entity>> {
        self.inner.query(ns, opts).await
    }

    async fn count(&self, ns: &str, opts: &S::Query) -> Result<u64> {
        self.inner.count(ns, opts).await
    }

    async fn created_by_day(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DayCount>> {
        self.inner.created_by_day(ns, start, end).await
    }

    async fn setup(&self, ns: &str) -> Result<()> {
        self.inner.setup(ns).await
    }

    async fn teardown(&self, ns: &str) -> Result<()> {
        self.inner.teardown(ns).await
    }
}
