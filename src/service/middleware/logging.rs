//! Structured logging of every storage call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::service::{DayCount, Store};

/// Logs inputs, duration and failures of the inner store (target `service`).
pub struct Logging<S> {
    inner: S,
}

impl<S: Store> Logging<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn log<T>(service: &str, method: &str, ns: &str, input: &dyn std::fmt::Debug, start: Instant, result: &Result<T>) {
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(_) => debug!(target: "service", service, method, namespace = ns, duration_ms, input = ?input, "ok"),
        Err(err) => warn!(
            target: "service",
            service,
            method,
            namespace = ns,
            duration_ms,
            input = ?input,
            error = %err,
            "failed"
        ),
    }
}

#[async_trait]
impl<S: Store> Store for Logging<S> {
    type Entity = S::Entity;
    type Query = S::Query;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn put(&self, ns: &str, entity: S::Entity) -> Result<S::Entity> {
        let start = Instant::now();
        let input = entity.clone();
        let result = self.inner.put(ns, entity).await;
        log(self.name(), "Put", ns, &input, start, &result);
        result
    }

    async fn put_all(&self, ns: &str, entities: Vec<S::Entity>) -> Result<Vec<S::Entity>> {
        let start = Instant::now();
        let input = entities.clone();
        let result = self.inner.put_all(ns, entities).await;
        log(self.name(), "PutAll", ns, &input, start, &result);
        result
    }

    async fn query(&self, ns: &str, opts: &S::Query) -> Result<Vec<S::Entity>> {
        let start = Instant::now();
        let result = self.inner.query(ns, opts).await;
        log(self.name(), "Query", ns, opts, start, &result);
        result
    }

    async fn count(&self, ns: &str, opts: &S::Query) -> Result<u64> {
        let start = Instant::now();
        let result = self.inner.count(ns, opts).await;
        log(self.name(), "Count", ns, opts, start, &result);
        result
    }

    async fn created_by_day(&self, ns: &str, start_at: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DayCount>> {
        let start = Instant::now();
        let result = self.inner.created_by_day(ns, start_at, end).await;
        log(self.name(), "CreatedByDay", ns, &(start_at, end), start, &result);
        result
    }

    async fn setup(&self, ns: &str) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.setup(ns).await;
        log(self.name(), "Setup", ns, &(), start, &result);
        result
    }

    async fn teardown(&self, ns: &str) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.teardown(ns).await;
        log(self.name(), "Teardown", ns, &(), start, &result);
        result
    }
}
