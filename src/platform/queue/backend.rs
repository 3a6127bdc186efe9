//! Backend trait for the queue service.

use super::types::{Attributes, QueueMessage};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Storage of queued messages.
///
/// Receives never block: the long-poll loop lives in
/// [`super::QueueService`].
#[async_trait]
pub trait QueueBackend: Send + Sync + 'static {
    /// Appends a message and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or the write fails.
    async fn send(&self, queue: &str, body: &str, attributes: &Attributes) -> Result<String>;

    /// Takes the oldest visible message, hiding it for `visibility_timeout`
    /// under a fresh receipt handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    async fn receive(&self, queue: &str, visibility_timeout: Duration) -> Result<Option<QueueMessage>>;

    /// Deletes the message delivered under `receipt_handle`.
    ///
    /// Returns false when the handle is unknown or stale (the message was
    /// deleted already or re-delivered under another handle).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<bool>;

    /// Number of messages in the queue, visible or in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    async fn len(&self, queue: &str) -> Result<usize>;
}
