//! Follow and friend connections between users.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::document::{self, Documents};
use super::schema::{self, expr};
use super::{DayCount, Identity, Store, codec};
use crate::error::{Error, Result};
use crate::platform::sql::{Clauses, SqlService, Value};

/// Kind of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Follow,
    Friend,
}

impl ConnectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Friend => "friend",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConnectionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "follow" => Ok(Self::Follow),
            "friend" => Ok(Self::Friend),
            other => Err(Error::InvalidConnection(format!("unsupported type '{other}'"))),
        }
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Pending,
    Confirmed,
    Rejected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConnectionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "rejected" => Ok(Self::Rejected),
            other => Err(Error::InvalidConnection(format!("unsupported state '{other}'"))),
        }
    }
}

/// Directed connection keyed by `(from_id, to_id, type)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default, rename = "user_from_id", with = "codec::id")]
    pub from_id: u64,
    #[serde(default, rename = "user_to_id", with = "codec::id")]
    pub to_id: u64,
    #[serde(default, rename = "type")]
    pub kind: ConnectionType,
    #[serde(default)]
    pub state: ConnectionState,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, with = "codec::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "codec::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Semantic checks before storing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConnection`] for self-connections or missing
    /// endpoints.
    pub fn validate(&self) -> Result<()> {
        if self.from_id == 0 {
            return Err(Error::InvalidConnection("from id not set".into()));
        }
        if self.to_id == 0 {
            return Err(Error::InvalidConnection("to id not set".into()));
        }
        if self.from_id == self.to_id {
            return Err(Error::InvalidConnection("self-connection".into()));
        }
        Ok(())
    }

    /// The endpoint that is not `user_id`.
    pub fn counterparty(&self, user_id: u64) -> u64 {
        if self.from_id == user_id { self.to_id } else { self.from_id }
    }
}

impl Identity for Connection {
    type Query = ConnectionQuery;

    fn identity(&self) -> Option<ConnectionQuery> {
        Some(ConnectionQuery {
            from_ids: vec![self.from_id],
            to_ids: vec![self.to_id],
            types: vec![self.kind],
            ..Default::default()
        })
    }
}

/// Filters of a connection query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionQuery {
    /// Only entities created strictly after.
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub enabled: Option<bool>,
    pub from_ids: Vec<u64>,
    pub limit: Option<usize>,
    pub states: Vec<ConnectionState>,
    pub to_ids: Vec<u64>,
    pub types: Vec<ConnectionType>,
}

fn clauses(opts: &ConnectionQuery) -> Result<Clauses> {
    let mut c = Clauses::default();
    document::after(&mut c, opts.after);
    document::before(&mut c, opts.before);
    c.eq_opt(expr::ENABLED, opts.enabled);
    document::ids(&mut c, expr::FROM_ID, &opts.from_ids)?;
    c.any_of("json_extract(json_data, '$.state')", opts.states.iter().map(|s| s.as_str()));
    document::ids(&mut c, expr::TO_ID, &opts.to_ids)?;
    c.any_of(expr::TYPE, opts.types.iter().map(|t| t.as_str()));
    Ok(c)
}

/// Connection storage on SQLite documents.
pub struct SqlConnectionStore {
    docs: Documents,
}

impl SqlConnectionStore {
    pub fn new(sql: SqlService) -> Self {
        Self {
            docs: Documents::new(sql, schema::CONNECTIONS, schema::tenant),
        }
    }

    /// Validates `con` and builds the statement storing it, keeping the
    /// creation time of the stored version.
    async fn prepare(
        &self,
        ns: &str,
        mut con: Connection,
        now: DateTime<Utc>,
    ) -> Result<(Connection, (String, Vec<Value>))> {
        con.validate()?;
        self.docs.ensure_user(ns, con.from_id).await?;
        self.docs.ensure_user(ns, con.to_id).await?;
        con.updated_at = now;

        let existing = self
            .docs
            .select_rows::<Connection>(ns, &clauses(&con.identity().unwrap_or_default())?, Some(1))
            .await?
            .into_iter()
            .next();

        let statement = match existing {
            Some((row_id, old)) => {
                con.created_at = old.created_at;
                self.docs.replace_statement(ns, row_id, &con)?
            },
            None => {
                if con.created_at == DateTime::<Utc>::default() {
                    con.created_at = now;
                }
                self.docs.insert_statement(ns, &con)?
            },
        };
        Ok((con, statement))
    }
}

#[async_trait]
impl Store for SqlConnectionStore {
    type Entity = Connection;
    type Query = ConnectionQuery;

    fn name(&self) -> &'static str {
        "connections"
    }

    async fn put(&self, ns: &str, con: Connection) -> Result<Connection> {
        let (con, statement) = self.prepare(ns, con, Utc::now()).await?;
        self.docs.write_all(ns, vec![statement]).await?;
        Ok(con)
    }

    async fn put_all(&self, ns: &str, cons: Vec<Connection>) -> Result<Vec<Connection>> {
        let now = Utc::now();
        let mut stored = Vec::with_capacity(cons.len());
        let mut statements = Vec::with_capacity(cons.len());
        for con in cons {
            let (con, statement) = self.prepare(ns, con, now).await?;
            stored.push(con);
            statements.push(statement);
        }
        self.docs.write_all(ns, statements).await?;
        Ok(stored)
    }

    async fn query(&self, ns: &str, opts: &ConnectionQuery) -> Result<Vec<Connection>> {
        self.docs.select_window(ns, &clauses(opts)?, opts.limit, opts.after).await
    }

    async fn count(&self, ns: &str, opts: &ConnectionQuery) -> Result<u64> {
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
