//! Public `QueueService` API with long-polling receives.

use super::backend::QueueBackend;
use super::memory::MemoryQueue;
use super::sqlite::SqliteQueue;
use super::types::{Attributes, QueueConfig, QueueMessage};
use crate::platform::sql::SqlService;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Interval between backend polls while waiting. Sends from this process
/// wake waiters immediately; the interval covers sends from other processes.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

struct QueueServiceInner {
    backend: Arc<dyn QueueBackend>,
    config: QueueConfig,
    notify: Notify,
}

/// Queue service shared by producers and consumers.
#[derive(Clone)]
pub struct QueueService {
    inner: Arc<QueueServiceInner>,
}

impl QueueService {
    /// Create a service over a custom backend.
    pub fn new(backend: Arc<dyn QueueBackend>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueServiceInner {
                backend,
                config,
                notify: Notify::new(),
            }),
        }
    }

    /// Create an in-process queue service.
    pub fn memory(config: QueueConfig) -> Self {
        let backend = Arc::new(MemoryQueue::new(config.max_queue_size));
        Self::new(backend, config)
    }

    /// Create a queue service stored in the given SQLite database.
    pub fn sqlite(sql: SqlService, config: QueueConfig) -> Self {
        let backend = Arc::new(SqliteQueue::new(sql, config.max_queue_size));
        Self::new(backend, config)
    }

    /// Service configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Send a message to a queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or the backend write fails.
    pub async fn send(&self, queue: &str, body: &str, attributes: Attributes) -> Result<String> {
        let id = self.inner.backend.send(queue, body, &attributes).await?;
        self.inner.notify.notify_waiters();
        Ok(id)
    }

    /// Receive one message, waiting up to the configured wait time.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn receive(&self, queue: &str) -> Result<Option<QueueMessage>> {
        self.receive_timeout(queue, self.inner.config.wait_time).await
    }

    /// Receive one message, waiting up to `wait`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn receive_timeout(&self, queue: &str, wait: Duration) -> Result<Option<QueueMessage>> {
        let deadline = Instant::now() + wait;
        let visibility = self.inner.config.visibility_timeout;

        loop {
            // Register interest before polling so a concurrent send is not missed.
            let notified = self.inner.notify.notified();

            if let Some(msg) = self.inner.backend.receive(queue, visibility).await? {
                return Ok(Some(msg));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let nap = (deadline - now).min(POLL_INTERVAL);
            let _ = tokio::time::timeout(nap, notified).await;
        }
    }

    /// Delete (acknowledge) a received message.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<bool> {
        self.inner.backend.delete(queue, receipt_handle).await
    }

    /// Number of messages in a queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn len(&self, queue: &str) -> Result<usize> {
        self.inner.backend.len(queue).await
    }

    /// Check if a queue is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn is_empty(&self, queue: &str) -> Result<bool> {
        Ok(self.len(queue).await? == 0)
    }
}
