//! Change sources: durable propagation of entity state changes.
//!
//! Every write of a sourced entity publishes `{namespace, old, new}` onto the
//! entity's queue. Consumers receive the change with its receipt handle as
//! the ack id and acknowledge once all effects are done; unacknowledged
//! changes are re-delivered after the visibility timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use crate::error::Result;
use crate::platform::queue::{Attributes, QueueService};

/// Attribute carrying the publication time of a change.
pub const ATTRIBUTE_SENT_AT: &str = "SentAt";

const SENT_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// Renders a `SentAt` attribute, e.g. `2016-05-01 10:00:00.5 +0000 UTC`.
pub fn format_sent_at(at: &DateTime<Utc>) -> String {
    format!("{} UTC", at.format(SENT_AT_FORMAT))
}

/// Parses a `SentAt` attribute, ignoring the trailing zone abbreviation.
pub fn parse_sent_at(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.rsplit_once(' ').map_or(raw, |(head, _)| head);
    DateTime::parse_from_str(trimmed, SENT_AT_FORMAT)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// A consumed change of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange<T> {
    pub namespace: String,
    pub old: Option<T>,
    pub new: T,
    pub sent_at: Option<DateTime<Utc>>,
    pub message_id: String,
    pub ack_id: String,
}

/// Outcome of a consume.
#[derive(Debug, Clone, PartialEq)]
pub enum Consumed<T> {
    Change(StateChange<T>),
    /// No change arrived within the wait time.
    EmptySource,
}

/// Queue adapter offering propagate, consume and ack.
#[async_trait]
pub trait Source<T>: Send + Sync + 'static {
    /// Publishes a change and returns the message id.
    async fn propagate(&self, ns: &str, old: Option<&T>, new: &T) -> Result<String>;

    /// Receives the next change, long-polling up to the queue wait time.
    async fn consume(&self) -> Result<Consumed<T>>;

    /// Removes an acknowledged change from the queue.
    async fn ack(&self, ack_id: &str) -> Result<()>;
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    namespace: &'a str,
    old: Option<&'a T>,
    new: &'a T,
}

#[derive(Deserialize)]
struct OwnedEnvelope<T> {
    namespace: String,
    old: Option<T>,
    new: T,
}

/// [`Source`] over a named queue of the queue service.
pub struct QueueSource<T> {
    queue: QueueService,
    name: &'static str,
    _entity: PhantomData<fn() -> T>,
}

impl<T> QueueSource<T> {
    pub fn new(queue: QueueService, name: &'static str) -> Self {
        Self {
            queue,
            name,
            _entity: PhantomData,
        }
    }

    /// Queue name of this source.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[async_trait]
impl<T> Source<T> for QueueSource<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn propagate(&self, ns: &str, old: Option<&T>, new: &T) -> Result<String> {
        let body = serde_json::to_string(&Envelope {
            namespace: ns,
            old,
            new,
        })?;

        let mut attributes = Attributes::new();
        attributes.insert(ATTRIBUTE_SENT_AT.to_string(), format_sent_at(&Utc::now()));

        Ok(self.queue.send(self.name, &body, attributes).await?)
    }

    async fn consume(&self) -> Result<Consumed<T>> {
        let Some(msg) = self.queue.receive(self.name).await? else {
            return Ok(Consumed::EmptySource);
        };

        let envelope: OwnedEnvelope<T> = serde_json::from_str(&msg.body)?;
        let sent_at = msg
            .attributes
            .get(ATTRIBUTE_SENT_AT)
            .and_then(|raw| parse_sent_at(raw));

        Ok(Consumed::Change(StateChange {
            namespace: envelope.namespace,
            old: envelope.old,
            new: envelope.new,
            sent_at,
            message_id: msg.id,
            ack_id: msg.receipt_handle,
        }))
    }

    async fn ack(&self, ack_id: &str) -> Result<()> {
        self.queue.delete(self.name, ack_id).await?;
        Ok(())
    }
}
