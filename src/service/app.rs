//! Applications (tenants) stored in the global namespace.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

use super::codec::{Redacted, RedactedList};
use super::document::{self, Documents};
use super::schema::{self, expr};
use super::{DayCount, Identity, Store, codec};
use crate::constants;
use crate::error::{Error, Result};
use crate::platform::flake;
use crate::platform::sql::{Clauses, SqlService, Value};

/// A tenant application.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    #[serde(default, with = "codec::id")]
    pub id: u64,
    #[serde(default, with = "codec::id")]
    pub org_id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Application-scoped token (32 chars).
    pub token: String,
    /// Backend-scoped token (44 chars).
    pub backend_token: String,
    #[serde(default)]
    pub public_id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub in_production: bool,
    #[serde(default, with = "codec::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "codec::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl App {
    /// A new enabled app with fresh tokens.
    pub fn new(org_id: u64, name: impl Into<String>, description: impl Into<String>, in_production: bool) -> Self {
        let mut rng = rand::thread_rng();

        let mut token = [0u8; constants::APP_TOKEN_LEN / 2];
        rng.fill_bytes(&mut token);
        let mut backend = [0u8; constants::BACKEND_TOKEN_LEN / 4 * 3];
        rng.fill_bytes(&mut backend);
        let mut public = [0u8; 8];
        rng.fill_bytes(&mut public);

        Self {
            org_id,
            name: name.into(),
            description: description.into(),
            token: hex::encode(token),
            backend_token: URL_SAFE.encode(backend),
            public_id: hex::encode(public),
            enabled: true,
            in_production,
            ..Default::default()
        }
    }

    /// Namespace of the app's tenant data.
    pub fn namespace(&self) -> String {
        format!("app_{}_{}", self.org_id, self.id)
    }

    /// Default requests per rate-limit window.
    pub fn limit(&self) -> i64 {
        if self.in_production {
            constants::RATE_LIMIT_PRODUCTION
        } else {
            constants::RATE_LIMIT_STAGING
        }
    }

    /// Constant-time match against the application token.
    pub fn matches_token(&self, candidate: &str) -> bool {
        bool::from(self.token.as_bytes().ct_eq(candidate.as_bytes()))
    }

    /// Constant-time match against the backend token.
    pub fn matches_backend_token(&self, candidate: &str) -> bool {
        bool::from(self.backend_token.as_bytes().ct_eq(candidate.as_bytes()))
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid("app: missing name"));
        }
        if self.org_id == 0 {
            return Err(Error::invalid("app: missing org"));
        }
        if self.token.len() != constants::APP_TOKEN_LEN {
            return Err(Error::invalid("app: malformed token"));
        }
        if self.backend_token.len() != constants::BACKEND_TOKEN_LEN {
            return Err(Error::invalid("app: malformed backend token"));
        }
        Ok(())
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("id", &self.id)
            .field("org_id", &self.org_id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("token", &Redacted(&self.token))
            .field("backend_token", &Redacted(&self.backend_token))
            .field("public_id", &self.public_id)
            .field("enabled", &self.enabled)
            .field("in_production", &self.in_production)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl Identity for App {
    type Query = AppQuery;

    fn identity(&self) -> Option<AppQuery> {
        (self.id != 0).then(|| AppQuery {
            ids: vec![self.id],
            ..Default::default()
        })
    }
}

/// Filters of an app query.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AppQuery {
    pub backend_tokens: Vec<String>,
    pub enabled: Option<bool>,
    pub ids: Vec<u64>,
    pub in_production: Option<bool>,
    pub tokens: Vec<String>,
}

impl fmt::Debug for AppQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppQuery")
            .field("backend_tokens", &RedactedList(&self.backend_tokens))
            .field("enabled", &self.enabled)
            .field("ids", &self.ids)
            .field("in_production", &self.in_production)
            .field("tokens", &RedactedList(&self.tokens))
            .finish()
    }
}

fn clauses(opts: &AppQuery) -> Result<Clauses> {
    let mut c = Clauses::default();
    c.any_of("json_extract(json_data, '$.backend_token')", opts.backend_tokens.iter());
    c.eq_opt(expr::ENABLED, opts.enabled);
    document::ids(&mut c, expr::ID, &opts.ids)?;
    c.eq_opt("json_extract(json_data, '$.in_production')", opts.in_production);
    c.any_of("json_extract(json_data, '$.token')", opts.tokens.iter());
    Ok(c)
}

/// App storage on SQLite documents.
pub struct SqlAppStore {
    docs: Documents,
}

impl SqlAppStore {
    pub fn new(sql: SqlService) -> Self {
        Self {
            docs: Documents::new(sql, schema::APPS, schema::global),
        }
    }
}

#[async_trait]
impl Store for SqlAppStore {
    type Entity = App;
    type Query = AppQuery;

    fn name(&self) -> &'static str {
        "apps"
    }

    async fn put(&self, ns: &str, mut app: App) -> Result<App> {
        app.validate()?;

        let now = Utc::now();
        app.updated_at = now;

        if app.id == 0 {
            app.id = flake::next_id(ns, schema::APPS);
            app.created_at = now;
            self.docs.insert(ns, &app).await?;
            return Ok(app);
        }

        let mut c = Clauses::default();
        c.eq(expr::ID, Value::try_from(app.id)?);
        let (row_id, existing) = self
            .docs
            .select_rows::<App>(ns, &c, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("app {}", app.id)))?;

        app.created_at = existing.created_at;
        self.docs.replace(ns, row_id, &app).await?;
        Ok(app)
    }

    async fn query(&self, ns: &str, opts: &AppQuery) -> Result<Vec<App>> {
        let mut apps: Vec<App> = self.docs.select(ns, &clauses(opts)?, None).await?;

        // The index lookup narrows candidates; the final match is constant-time.
        if !opts.tokens.is_empty() {
            apps.retain(|app| opts.tokens.iter().any(|t| app.matches_token(t)));
        }
        if !opts.backend_tokens.is_empty() {
            apps.retain(|app| opts.backend_tokens.iter().any(|t| app.matches_backend_token(t)));
        }
        Ok(apps)
    }

    async fn count(&self, ns: &str, opts: &AppQuery) -> Result<u64> {
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
