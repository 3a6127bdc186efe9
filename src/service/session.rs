//! Login sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::codec::{Redacted, RedactedList};
use super::document::{self, Documents};
use super::schema;
use super::{DayCount, Identity, Store, codec};
use crate::error::{Error, Result};
use crate::platform::sql::{Clauses, Row, SqlService, Value, qualify};

/// Opaque bearer issued at login.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(with = "codec::id")]
    pub user_id: u64,
    pub enabled: bool,
    #[serde(default, with = "codec::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &Redacted(&self.id))
            .field("user_id", &self.user_id)
            .field("enabled", &self.enabled)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Identity for Session {
    type Query = SessionQuery;

    fn identity(&self) -> Option<SessionQuery> {
        Some(SessionQuery {
            ids: vec![self.id.clone()],
            ..Default::default()
        })
    }
}

/// Filters of a session query.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionQuery {
    pub enabled: Option<bool>,
    pub ids: Vec<String>,
    pub limit: Option<usize>,
    pub user_ids: Vec<u64>,
}

impl fmt::Debug for SessionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionQuery")
            .field("enabled", &self.enabled)
            .field("ids", &RedactedList(&self.ids))
            .field("limit", &self.limit)
            .field("user_ids", &self.user_ids)
            .finish()
    }
}

fn clauses(opts: &SessionQuery) -> Result<Clauses> {
    let mut c = Clauses::default();
    c.eq_opt("enabled", opts.enabled);
    c.any_of("id", opts.ids.iter());
    document::ids(&mut c, "user_id", &opts.user_ids)?;
    Ok(c)
}

fn from_row(row: &Row) -> Result<Session> {
    Ok(Session {
        id: row.text("id")?.to_string(),
        user_id: u64::try_from(row.integer("user_id")?).unwrap_or(0),
        enabled: row.integer("enabled")? != 0,
        created_at: codec::parse_timestamp(row.text("created_at")?).map_err(anyhow::Error::from)?,
    })
}

/// Session storage on a plain SQLite table.
pub struct SqlSessionStore {
    docs: Documents,
}

impl SqlSessionStore {
    pub fn new(sql: SqlService) -> Self {
        Self {
            docs: Documents::new(sql, schema::SESSIONS, schema::tenant),
        }
    }

    fn sql(&self) -> &SqlService {
        self.docs.sql()
    }
}

#[async_trait]
impl Store for SqlSessionStore {
    type Entity = Session;
    type Query = SessionQuery;

    fn name(&self) -> &'static str {
        "sessions"
    }

    async fn put(&self, ns: &str, mut session: Session) -> Result<Session> {
        if session.id.is_empty() {
            return Err(Error::invalid("session: missing id"));
        }
        self.docs.ensure_user(ns, session.user_id).await?;

        if session.created_at == DateTime::<Utc>::default() {
            session.created_at = Utc::now();
        }

        let table = qualify(ns, schema::SESSIONS)?;
        self.sql()
            .execute_or_setup(
                &schema::tenant(ns)?,
                &format!(
                    "INSERT INTO {table} (id, user_id, enabled, created_at) VALUES (?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET user_id = excluded.user_id, enabled = excluded.enabled"
                ),
                &[
                    Value::from(&session.id),
                    Value::try_from(session.user_id)?,
                    Value::from(session.enabled),
                    Value::Text(codec::format_timestamp(&session.created_at)),
                ],
            )
            .await?;

        let stored = self
            .query(
                ns,
                &SessionQuery {
                    ids: vec![session.id.clone()],
                    ..Default::default()
                },
            )
            .await?;
        stored
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("session {}", session.id)))
    }

    async fn query(&self, ns: &str, opts: &SessionQuery) -> Result<Vec<Session>> {
        let table = qualify(ns, schema::SESSIONS)?;
        let c = clauses(opts)?;
        let limit = opts.limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
        let rows = self
            .sql()
            .query_or_setup(
                &schema::tenant(ns)?,
                &format!(
                    "SELECT id, user_id, enabled, created_at FROM {table}{} ORDER BY created_at DESC{limit}",
                    c.render()
                ),
                c.params(),
            )
            .await?;
        rows.iter().map(from_row).collect()
    }

    async fn count(&self, ns: &str, opts: &SessionQuery) -> Result<u64> {
        self.docs.count(ns, &clauses(opts)?).await
    }

    async fn created_by_day(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DayCount>> {
        self.docs.created_by_day_on(ns, "created_at", start, end).await
    }

    async fn setup(&self, ns: &str) -> Result<()> {
        self.docs.setup(ns).await
    }

    async fn teardown(&self, ns: &str) -> Result<()> {
        self.docs.teardown(ns).await
    }
}
