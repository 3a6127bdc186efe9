//! Engagement events: likes, user-declared activity and targeted actions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::document::{self, Documents};
use super::schema::{self, expr};
use super::{DayCount, Identity, Store, Visibility, codec};
use crate::error::{Error, Result};
use crate::platform::flake;
use crate::platform::sql::{Clauses, SqlService, Value};

pub const TYPE_LIKE: &str = "tg_like";
pub const TYPE_COMMENT: &str = "tg_comment";
pub const TYPE_SHARE: &str = "tg_share";
pub const TYPE_FOLLOW: &str = "tg_follow";
pub const TYPE_FRIEND: &str = "tg_friend";

/// Reference to something outside the platform, or a target of the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalObject {
    #[serde(default, with = "codec::text_id")]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub display_names: BTreeMap<String, String>,
}

/// Targets share the shape of external objects.
pub type Target = ExternalObject;

/// Engagement record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, with = "codec::id")]
    pub id: u64,
    #[serde(default, with = "codec::id")]
    pub user_id: u64,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub owned: bool,
    /// Internal object (post) the event refers to; 0 when unset.
    #[serde(default, with = "codec::id")]
    pub object_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ExternalObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, with = "codec::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "codec::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Semantic checks before storing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntity`] when the owner or type is missing.
    pub fn validate(&self) -> Result<()> {
        if self.user_id == 0 {
            return Err(Error::invalid("event: missing user"));
        }
        if self.kind.is_empty() {
            return Err(Error::invalid("event: missing type"));
        }
        if let Some(object) = &self.object
            && object.id.is_empty()
        {
            return Err(Error::invalid("event: object without id"));
        }
        Ok(())
    }

    /// Whether the event is a like of `post_id`.
    pub fn is_like_of(&self, post_id: u64) -> bool {
        self.kind == TYPE_LIKE && self.owned && self.object_id == post_id
    }
}

impl Identity for Event {
    type Query = EventQuery;

    fn identity(&self) -> Option<EventQuery> {
        (self.id != 0).then(|| EventQuery {
            ids: vec![self.id],
            ..Default::default()
        })
    }
}

/// Filters of an event query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    /// Only entities created strictly after.
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub enabled: Option<bool>,
    pub external_object_ids: Vec<String>,
    pub external_object_types: Vec<String>,
    pub ids: Vec<u64>,
    pub limit: Option<usize>,
    pub object_ids: Vec<u64>,
    pub owned: Option<bool>,
    pub target_ids: Vec<String>,
    pub target_types: Vec<String>,
    pub types: Vec<String>,
    /// Only events updated after this instant.
    pub updated_after: Option<DateTime<Utc>>,
    pub user_ids: Vec<u64>,
    pub visibilities: Vec<Visibility>,
}

fn clauses(opts: &EventQuery) -> Result<Clauses> {
    let mut c = Clauses::default();
    document::after(&mut c, opts.after);
    document::before(&mut c, opts.before);
    c.eq_opt(expr::ENABLED, opts.enabled);
    c.any_of("json_extract(json_data, '$.object.id')", opts.external_object_ids.iter());
    c.any_of("json_extract(json_data, '$.object.type')", opts.external_object_types.iter());
    document::ids(&mut c, expr::ID, &opts.ids)?;
    document::ids(&mut c, expr::OBJECT_ID, &opts.object_ids)?;
    c.eq_opt(expr::OWNED, opts.owned);
    c.any_of("json_extract(json_data, '$.target.id')", opts.target_ids.iter());
    c.any_of("json_extract(json_data, '$.target.type')", opts.target_types.iter());
    c.any_of(expr::TYPE, opts.types.iter());
    if let Some(after) = opts.updated_after {
        c.greater_than(expr::UPDATED_AT, codec::format_timestamp(&after));
    }
    document::ids(&mut c, expr::USER_ID, &opts.user_ids)?;
    c.any_of(expr::VISIBILITY, opts.visibilities.iter().map(|v| u8::from(*v)));
    Ok(c)
}

/// Event storage on SQLite documents.
pub struct SqlEventStore {
    docs: Documents,
}

impl SqlEventStore {
    pub fn new(sql: SqlService) -> Self {
        Self {
            docs: Documents::new(sql, schema::EVENTS, schema::tenant),
        }
    }
}

#[async_trait]
impl Store for SqlEventStore {
    type Entity = Event;
    type Query = EventQuery;

    fn name(&self) -> &'static str {
        "events"
    }

    async fn put(&self, ns: &str, mut event: Event) -> Result<Event> {
        event.validate()?;
        self.docs.ensure_user(ns, event.user_id).await?;

        let now = Utc::now();
        event.updated_at = now;

        if event.id == 0 {
            event.id = flake::next_id(ns, schema::EVENTS);
            if event.created_at == DateTime::<Utc>::default() {
                event.created_at = now;
            }
            self.docs.insert(ns, &event).await?;
            return Ok(event);
        }

        let mut c = Clauses::default();
        c.eq(expr::ID, Value::try_from(event.id)?);
        let (row_id, existing) = self
            .docs
            .select_rows::<Event>(ns, &c, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("event {}", event.id)))?;

        event.created_at = existing.created_at;
        self.docs.replace(ns, row_id, &event).await?;
        Ok(event)
    }

    async fn query(&self, ns: &str, opts: &EventQuery) -> Result<Vec<Event>> {
        self.docs.select_window(ns, &clauses(opts)?, opts.limit, opts.after).await
    }

    async fn count(&self, ns: &str, opts: &EventQuery) -> Result<u64> {
        self.docs.count(ns, &clauses(opts)?).await
    }

    async fn created_by_day(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DayCount>> {
        self.docs.created_by_day(ns, start, end).await
    }

    async fn setup(&self, ns: &str) -> Result<()> {
        self.docs.setup(ns).await
    }

    async fn teardown(&self, ns: &str) -> Result<()> {
        self.docs.teardown(ns).await
    }
}
