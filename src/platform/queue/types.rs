//! Core types for the queue service.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::constants;

/// String attributes attached to a message.
pub type Attributes = BTreeMap<String, String>;

/// Message handed to a consumer.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Unique message identifier (UUID v4), stable across deliveries.
    pub id: String,
    /// Message payload.
    pub body: String,
    /// Message attributes.
    pub attributes: Attributes,
    /// Handle of this delivery, required to delete the message.
    pub receipt_handle: String,
    /// Number of times the message has been received, including this one.
    pub receive_count: u32,
    /// Timestamp when the message was sent.
    pub sent_at: DateTime<Utc>,
}

/// Configuration for the queue service.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Long-poll bound of a receive.
    pub wait_time: Duration,
    /// Time a received message stays hidden.
    pub visibility_timeout: Duration,
    /// Maximum size per queue (None = unlimited).
    pub max_queue_size: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(constants::QUEUE_WAIT_SECS),
            visibility_timeout: Duration::from_secs(constants::QUEUE_VISIBILITY_TIMEOUT_SECS),
            max_queue_size: None,
        }
    }
}
