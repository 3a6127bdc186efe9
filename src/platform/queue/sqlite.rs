//! SQLite queue backend.
//!
//! Messages live in one `queue_messages` table. A receive is a single
//! `UPDATE ... RETURNING` statement, so two processes never obtain the same
//! delivery.

use super::backend::QueueBackend;
use super::types::{Attributes, QueueMessage};
use crate::platform::sql::{SqlService, Value};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

const SETUP: &str = "CREATE TABLE IF NOT EXISTS queue_messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    queue TEXT NOT NULL,
    body TEXT NOT NULL,
    attributes TEXT NOT NULL,
    sent_at INTEGER NOT NULL,
    visible_at INTEGER NOT NULL,
    receipt TEXT,
    receive_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS queue_messages_visible ON queue_messages (queue, visible_at);
CREATE INDEX IF NOT EXISTS queue_messages_receipt ON queue_messages (receipt);";

const SEND: &str = "INSERT INTO queue_messages (id, queue, body, attributes, sent_at, visible_at)
    VALUES (?, ?, ?, ?, ?, ?)";

const RECEIVE: &str = "UPDATE queue_messages
    SET visible_at = ?, receipt = ?, receive_count = receive_count + 1
    WHERE seq = (
        SELECT seq FROM queue_messages
        WHERE queue = ? AND visible_at <= ?
        ORDER BY seq LIMIT 1
    )
    RETURNING id, body, attributes, sent_at, receive_count";

const DELETE: &str = "DELETE FROM queue_messages WHERE queue = ? AND receipt = ?";

const LEN: &str = "SELECT COUNT(*) AS n FROM queue_messages WHERE queue = ?";

/// Queue backend stored in a SQLite table.
pub struct SqliteQueue {
    sql: SqlService,
    max_queue_size: Option<usize>,
}

impl SqliteQueue {
    /// Create a backend on top of an existing SQL service.
    pub fn new(sql: SqlService, max_queue_size: Option<usize>) -> Self {
        Self { sql, max_queue_size }
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

#[async_trait]
impl QueueBackend for SqliteQueue {
    async fn send(&self, queue: &str, body: &str, attributes: &Attributes) -> Result<String> {
        if let Some(max) = self.max_queue_size
            && self.len(queue).await? >= max
        {
            anyhow::bail!("Queue is full (max size: {max})");
        }

        let id = Uuid::new_v4().to_string();
        let now = millis(Utc::now());
        let attributes = serde_json::to_string(attributes).context("Failed to encode attributes")?;

        self.sql
            .execute_or_setup(
                SETUP,
                SEND,
                &[
                    Value::from(id.as_str()),
                    Value::from(queue),
                    Value::from(body),
                    Value::from(attributes),
                    Value::Integer(now),
                    Value::Integer(now),
                ],
            )
            .await
            .with_context(|| format!("Failed to send message to queue '{queue}'"))?;

        Ok(id)
    }

    async fn receive(&self, queue: &str, visibility_timeout: Duration) -> Result<Option<QueueMessage>> {
        let now = Utc::now();
        let hidden_until = now + chrono::Duration::from_std(visibility_timeout)?;
        let receipt_handle = Uuid::new_v4().to_string();

        let rows = self
            .sql
            .query_or_setup(
                SETUP,
                RECEIVE,
                &[
                    Value::Integer(millis(hidden_until)),
                    Value::from(receipt_handle.as_str()),
                    Value::from(queue),
                    Value::Integer(millis(now)),
                ],
            )
            .await
            .with_context(|| format!("Failed to receive from queue '{queue}'"))?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };

        let attributes: Attributes =
            serde_json::from_str(row.text("attributes")?).context("Corrupt message attributes")?;
        let sent_at = DateTime::from_timestamp_millis(row.integer("sent_at")?).unwrap_or(now);

        Ok(Some(QueueMessage {
            id: row.text("id")?.to_string(),
            body: row.text("body")?.to_string(),
            attributes,
            receipt_handle,
            receive_count: u32::try_from(row.integer("receive_count")?).unwrap_or(u32::MAX),
            sent_at,
        }))
    }

    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<bool> {
        let affected = self
            .sql
            .execute_or_setup(SETUP, DELETE, &[Value::from(queue), Value::from(receipt_handle)])
            .await
            .with_context(|| format!("Failed to delete from queue '{queue}'"))?;
        Ok(affected > 0)
    }

    async fn len(&self, queue: &str) -> Result<usize> {
        let rows = self.sql.query_or_setup(SETUP, LEN, &[Value::from(queue)]).await?;
        let n = rows.first().map_or(Ok(0), |row| row.integer("n"))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}
