//! Users of an application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::codec::Redacted;
use super::document::{self, Documents};
use super::schema::{self, expr};
use super::{DayCount, Identity, Store, codec};
use crate::error::{Error, Result};
use crate::platform::flake;
use crate::platform::sql::{Clauses, SqlService, Value};

/// Identifier used for events targeting a user.
pub const TARGET_TYPE: &str = "tg_user";

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 40;

/// Image asset of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub width: u32,
}

/// Customer of an app.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, with = "codec::id")]
    pub id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_id: String,
    #[serde(default, rename = "user_name")]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Salted verifier of the password, never the password itself once stored.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub social_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub images: BTreeMap<String, Image>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, with = "codec::timestamp::option", skip_serializing_if = "Option::is_none")]
    pub last_read: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_friend: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_follower: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followed_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friend_count: Option<u64>,
    /// Session of the requesting device, only set for the user themself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, with = "codec::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "codec::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("custom_id", &self.custom_id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("url", &self.url)
            .field("password", &Redacted(&self.password))
            .field("social_ids", &self.social_ids)
            .field("metadata", &self.metadata)
            .field("images", &self.images)
            .field("enabled", &self.enabled)
            .field("deleted", &self.deleted)
            .field("last_read", &self.last_read)
            .field("is_friend", &self.is_friend)
            .field("is_follower", &self.is_follower)
            .field("is_following", &self.is_following)
            .field("follower_count", &self.follower_count)
            .field("followed_count", &self.followed_count)
            .field("friend_count", &self.friend_count)
            .field("session_token", &self.session_token.as_deref().map(Redacted))
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

fn check_length(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    let len = value.chars().count();
    if len < NAME_MIN {
        return Err(Error::InvalidUser(format!("{field} too short")));
    }
    if len > NAME_MAX {
        return Err(Error::InvalidUser(format!("{field} too long")));
    }
    Ok(())
}

impl User {
    /// Semantic checks before storing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUser`] naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.email.is_empty() && self.username.is_empty() {
            return Err(Error::InvalidUser("email or username must be set".into()));
        }
        if !self.email.is_empty() && !email_address::EmailAddress::is_valid(&self.email) {
            return Err(Error::InvalidUser("invalid email address".into()));
        }
        check_length("firstname", &self.first_name)?;
        check_length("lastname", &self.last_name)?;
        if !self.url.is_empty() && url::Url::parse(&self.url).is_err() {
            return Err(Error::InvalidUser("invalid url".into()));
        }
        if self.password.is_empty() {
            return Err(Error::InvalidUser("password must be set".into()));
        }
        check_length("username", &self.username)?;
        Ok(())
    }

    /// Drops the fields derived per request, which are never stored.
    pub fn clear_derived(&mut self) {
        self.is_friend = None;
        self.is_follower = None;
        self.is_following = None;
        self.follower_count = None;
        self.followed_count = None;
        self.friend_count = None;
        self.session_token = None;
    }
}

impl Identity for User {
    type Query = UserQuery;

    fn identity(&self) -> Option<UserQuery> {
        (self.id != 0).then(|| UserQuery {
            ids: vec![self.id],
            ..Default::default()
        })
    }
}

/// Filters of a user query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    /// Only entities created strictly after.
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub custom_ids: Vec<String>,
    pub deleted: Option<bool>,
    pub emails: Vec<String>,
    pub enabled: Option<bool>,
    pub ids: Vec<u64>,
    pub limit: Option<usize>,
    /// Prefix match on username, email, first and last name.
    pub search: Option<String>,
    /// Platform to platform-specific ids.
    pub social_ids: BTreeMap<String, Vec<String>>,
    pub usernames: Vec<String>,
}

fn like_prefix(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}

fn clauses(opts: &UserQuery) -> Result<Clauses> {
    let mut c = Clauses::default();
    document::after(&mut c, opts.after);
    document::before(&mut c, opts.before);
    c.any_of("json_extract(json_data, '$.custom_id')", opts.custom_ids.iter());
    c.eq_opt(expr::DELETED, opts.deleted);
    c.any_of("json_extract(json_data, '$.email')", opts.emails.iter());
    c.eq_opt(expr::ENABLED, opts.enabled);
    document::ids(&mut c, expr::ID, &opts.ids)?;
    c.any_of("json_extract(json_data, '$.user_name')", opts.usernames.iter());

    for (platform, ids) in &opts.social_ids {
        if platform.is_empty() || platform.contains('"') || platform.contains('\\') {
            return Err(Error::InvalidUser(format!("unsupported platform '{platform}'")));
        }
        if ids.is_empty() {
            continue;
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut params = vec![Value::Text(format!("$.social_ids.\"{platform}\""))];
        params.extend(ids.iter().map(Value::from));
        c.raw(format!("json_extract(json_data, ?) IN ({placeholders})"), params);
    }

    if let Some(term) = opts.search.as_deref().filter(|t| !t.is_empty()) {
        let pattern = like_prefix(term);
        let fields = ["user_name", "email", "first_name", "last_name"];
        let condition = fields
            .iter()
            .map(|f| format!("json_extract(json_data, '$.{f}') LIKE ? ESCAPE '\\'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        c.raw(
            format!("({condition})"),
            fields.iter().map(|_| Value::Text(pattern.clone())).collect(),
        );
    }
    Ok(c)
}

/// User storage on SQLite documents.
pub struct SqlUserStore {
    docs: Documents,
}

impl SqlUserStore {
    pub fn new(sql: SqlService) -> Self {
        Self {
            docs: Documents::new(sql, schema::USERS, schema::tenant),
        }
    }
}

#[async_trait]
impl Store for SqlUserStore {
    type Entity = User;
    type Query = UserQuery;

    fn name(&self) -> &'static str {
        "users"
    }

    async fn put(&self, ns: &str, mut user: User) -> Result<User> {
        user.validate()?;
        user.clear_derived();

        let now = Utc::now();
        user.updated_at = now;

        if user.id == 0 {
            user.id = flake::next_id(ns, schema::USERS);
            if user.created_at == DateTime::<Utc>::default() {
                user.created_at = now;
            }
            self.docs.insert(ns, &user).await?;
            return Ok(user);
        }

        let mut c = Clauses::default();
        c.eq(expr::ID, Value::try_from(user.id)?);
        let (row_id, existing) = self
            .docs
            .select_rows::<User>(ns, &c, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("user {}", user.id)))?;

        user.created_at = existing.created_at;
        self.docs.replace(ns, row_id, &user).await?;
        Ok(user)
    }

    async fn query(&self, ns: &str, opts: &UserQuery) -> Result<Vec<User>> {
        self.docs.select_window(ns, &clauses(opts)?, opts.limit, opts.after).await
    }

    async fn count(&self, ns: &str, opts: &UserQuery) -> Result<u64> {
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
