//! In-process queue backend.

use super::backend::QueueBackend;
use super::types::{Attributes, QueueMessage};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A stored message with its delivery state.
#[derive(Debug)]
struct Entry {
    id: String,
    body: String,
    attributes: Attributes,
    sent_at: DateTime<Utc>,
    receive_count: u32,
    /// Receipt handle and hidden-until deadline of the current delivery.
    inflight: Option<(String, Instant)>,
}

impl Entry {
    fn is_visible(&self, now: Instant) -> bool {
        self.inflight
            .as_ref()
            .is_none_or(|(_, hidden_until)| *hidden_until <= now)
    }
}

/// A single queue with its messages (internal).
#[derive(Debug, Default)]
struct Queue {
    entries: VecDeque<Entry>,
}

/// Queue backend living in process memory.
pub struct MemoryQueue {
    queues: RwLock<HashMap<String, Queue>>,
    max_queue_size: Option<usize>,
}

impl MemoryQueue {
    /// Create an empty backend with an optional per-queue size limit.
    pub fn new(max_queue_size: Option<usize>) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            max_queue_size,
        }
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn send(&self, queue: &str, body: &str, attributes: &Attributes) -> Result<String> {
        let mut queues = self.queues.write();
        let q = queues.entry(queue.to_string()).or_default();

        if let Some(max) = self.max_queue_size
            && q.entries.len() >= max
        {
            anyhow::bail!("Queue is full (max size: {max})");
        }

        let id = Uuid::new_v4().to_string();
        q.entries.push_back(Entry {
            id: id.clone(),
            body: body.to_string(),
            attributes: attributes.clone(),
            sent_at: Utc::now(),
            receive_count: 0,
            inflight: None,
        });
        Ok(id)
    }

    async fn receive(&self, queue: &str, visibility_timeout: Duration) -> Result<Option<QueueMessage>> {
        let now = Instant::now();
        let mut queues = self.queues.write();
        let Some(q) = queues.get_mut(queue) else {
            return Ok(None);
        };

        let Some(entry) = q.entries.iter_mut().find(|e| e.is_visible(now)) else {
            return Ok(None);
        };

        let receipt_handle = Uuid::new_v4().to_string();
        entry.receive_count += 1;
        entry.inflight = Some((receipt_handle.clone(), now + visibility_timeout));

        Ok(Some(QueueMessage {
            id: entry.id.clone(),
            body: entry.body.clone(),
            attributes: entry.attributes.clone(),
            receipt_handle,
            receive_count: entry.receive_count,
            sent_at: entry.sent_at,
        }))
    }

    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<bool> {
        let mut queues = self.queues.write();
        let Some(q) = queues.get_mut(queue) else {
            return Ok(false);
        };

        let position = q.entries.iter().position(|e| {
            e.inflight
                .as_ref()
                .is_some_and(|(handle, _)| handle == receipt_handle)
        });

        Ok(match position {
            Some(idx) => q.entries.remove(idx).is_some(),
            None => false,
        })
    }

    async fn len(&self, queue: &str) -> Result<usize> {
        let queues = self.queues.read();
        Ok(queues.get(queue).map_or(0, |q| q.entries.len()))
    }
}
