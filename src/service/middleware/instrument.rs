//! Operation counters and latency histograms per storage call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Instant;

use crate::error::Result;
use crate::service::{DayCount, Store};
use crate::telemetry;

/// Records `service_op_count`, `service_err_count` and
/// `service_op_latency_seconds` for the inner store.
pub struct Instrumented<S> {
    inner: S,
    store: &'static str,
}

impl<S: Store> Instrumented<S> {
    /// `store` names the backing store in the metric labels.
    pub fn new(inner: S, store: &'static str) -> Self {
        Self { inner, store }
    }

    fn track<T>(&self, method: &'static str, ns: &str, start: Instant, result: &Result<T>) {
        telemetry::record_service_op(
            method,
            ns,
            self.inner.name(),
            self.store,
            start.elapsed(),
            result.is_err(),
        );
    }
}

#[async_trait]
impl<S: Store> Store for Instrumented<S> {
    type Entity = S::Entity;
    type Query = S::Query;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn put(&self, ns: &str, entity: S::Entity) -> Result<S::Entity> {
        let start = Instant::now();
        let result = self.inner.put(ns, entity).await;
        self.track("Put", ns, start, &result);
        result
    }

    async fn put_all(&self, ns: &str, entities: Vec<S::Entity>) -> Result<Vec<S::Entity>> {
        let start = Instant::now();
        let result = self.inner.put_all(ns, entities).await;
        self.track("PutAll", ns, start, &result);
        result
    }

    async fn query(&self, ns: &str, opts: &S::Query) -> Result<Vec<S::Entity>> {
        let start = Instant::now();
        let result = self.inner.query(ns, opts).await;
        self.track("Query", ns, start, &result);
        result
    }

    async fn count(&self, ns: &str, opts: &S::Query) -> Result<u64> {
        let start = Instant::now();
        let result = self.inner.count(ns, opts).await;
        self.track("Count", ns, start, &result);
        result
    }

    async fn created_by_day(&self, ns: &str, start_at: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DayCount>> {
        let start = Instant::now();
        let result = self.inner.created_by_day(ns, start_at, end).await;
        self.track("CreatedByDay", ns, start, &result);
        result
    }

    async fn setup(&self, ns: &str) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.setup(ns).await;
        self.track("Setup", ns, start, &result);
        result
    }

    async fn teardown(&self, ns: &str) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.teardown(ns).await;
        self.track("Teardown", ns, start, &result);
        result
    }
}
