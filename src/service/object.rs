//! Generic content objects: posts, comments and user-defined types.

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

pub const TYPE_POST: &str = "tg_post";
pub const TYPE_COMMENT: &str = "tg_comment";

const MAX_ATTACHMENTS: usize = 5;
const MAX_TAGS: usize = 5;

/// Kind of attachment content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    #[default]
    Text,
    Url,
}

/// Typed media of an object, localised per language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: AttachmentType,
    /// Language to content.
    #[serde(default)]
    pub contents: BTreeMap<String, String>,
}

impl Attachment {
    pub fn text(name: impl Into<String>, contents: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentType::Text,
            contents,
        }
    }

    pub fn url(name: impl Into<String>, contents: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentType::Url,
            contents,
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidAttachment`] for a missing name, empty
    /// contents or unparsable urls.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidAttachment("name must be set".into()));
        }
        if self.contents.is_empty() {
            return Err(Error::InvalidAttachment(format!("'{}' has no contents", self.name)));
        }
        for (lang, content) in &self.contents {
            if content.is_empty() {
                return Err(Error::InvalidAttachment(format!("'{}' has empty content for '{lang}'", self.name)));
            }
            if self.kind == AttachmentType::Url && url::Url::parse(content).is_err() {
                return Err(Error::InvalidAttachment(format!("'{}' has invalid url for '{lang}'", self.name)));
            }
        }
        Ok(())
    }
}

/// Content record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Object {
    #[serde(default, with = "codec::id")]
    pub id: u64,
    #[serde(default, with = "codec::id")]
    pub owner_id: u64,
    /// Parent object; comments point at their post, posts carry 0.
    #[serde(default, with = "codec::id")]
    pub object_id: u64,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub owned: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default, with = "codec::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "codec::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Object {
    /// Semantic checks before storing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAttachment`] for a bad attachment and
    /// [`Error::InvalidEntity`] otherwise.
    pub fn validate(&self) -> Result<()> {
        if self.attachments.len() > MAX_ATTACHMENTS {
            return Err(Error::invalid("object: too many attachments"));
        }
        for attachment in &self.attachments {
            attachment.validate()?;
        }
        if self.owner_id == 0 {
            return Err(Error::invalid("object: missing owner"));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(Error::invalid("object: too many tags"));
        }
        if self.kind.is_empty() {
            return Err(Error::invalid("object: missing type"));
        }
        Ok(())
    }

    pub fn is_post(&self) -> bool {
        self.kind == TYPE_POST && self.owned
    }

    pub fn is_comment(&self) -> bool {
        self.kind == TYPE_COMMENT && self.owned
    }
}

impl Identity for Object {
    type Query = ObjectQuery;

    fn identity(&self) -> Option<ObjectQuery> {
        (self.id != 0).then(|| ObjectQuery {
            id: Some(self.id),
            ..Default::default()
        })
    }
}

/// Filters of an object query.
///
/// `deleted` is always applied: queries see either live or deleted objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectQuery {
    /// Only entities created strictly after.
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub external_ids: Vec<String>,
    pub id: Option<u64>,
    pub ids: Vec<u64>,
    pub limit: Option<usize>,
    pub object_ids: Vec<u64>,
    pub owned: Option<bool>,
    pub owner_ids: Vec<u64>,
    /// Objects carrying every one of these tags.
    pub tags: Vec<String>,
    pub types: Vec<String>,
    pub visibilities: Vec<Visibility>,
}

fn clauses(opts: &ObjectQuery) -> Result<Clauses> {
    let mut c = Clauses::default();
    document::after(&mut c, opts.after);
    document::before(&mut c, opts.before);
    c.eq(expr::DELETED, opts.deleted);
    c.any_of("json_extract(json_data, '$.external_id')", opts.external_ids.iter());
    c.eq_opt(expr::ID, opts.id.map(Value::try_from).transpose()?);
    document::ids(&mut c, expr::ID, &opts.ids)?;
    document::ids(&mut c, expr::OBJECT_ID, &opts.object_ids)?;
    c.eq_opt(expr::OWNED, opts.owned);
    document::ids(&mut c, expr::OWNER_ID, &opts.owner_ids)?;
    for tag in &opts.tags {
        c.raw(
            "EXISTS (SELECT 1 FROM json_each(json_data, '$.tags') WHERE json_each.value = ?)",
            vec![Value::from(tag)],
        );
    }
    c.any_of(expr::TYPE, opts.types.iter());
    c.any_of(expr::VISIBILITY, opts.visibilities.iter().map(|v| u8::from(*v)));
    Ok(c)
}

/// Object storage on SQLite documents.
pub struct SqlObjectStore {
    docs: Documents,
}

impl SqlObjectStore {
    pub fn new(sql: SqlService) -> Self {
        Self {
            docs: Documents::new(sql, schema::OBJECTS, schema::tenant),
        }
    }
}

#[async_trait]
impl Store for SqlObjectStore {
    type Entity = Object;
    type Query = ObjectQuery;

    fn name(&self) -> &'static str {
        "objects"
    }

    async fn put(&self, ns: &str, mut object: Object) -> Result<Object> {
        object.validate()?;
        self.docs.ensure_user(ns, object.owner_id).await?;

        let now = Utc::now();
        object.updated_at = now;

        if object.id == 0 {
            object.id = flake::next_id(ns, schema::OBJECTS);
            if object.created_at == DateTime::<Utc>::default() {
                object.created_at = now;
            }
            self.docs.insert(ns, &object).await?;
            return Ok(object);
        }

        let mut c = Clauses::default();
        c.eq(expr::ID, Value::try_from(object.id)?);
        let (row_id, existing) = self
            .docs
            .select_rows::<Object>(ns, &c, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("object {}", object.id)))?;

        object.created_at = existing.created_at;
        self.docs.replace(ns, row_id, &object).await?;
        Ok(object)
    }

    async fn query(&self, ns: &str, opts: &ObjectQuery) -> Result<Vec<Object>> {
        self.docs.select_window(ns, &clauses(opts)?, opts.limit, opts.after).await
    }

    async fn count(&self, ns: &str, opts: &ObjectQuery) -> Result<u64> {
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
