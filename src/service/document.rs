//! Shared access to JSON document tables.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::DayCount;
use super::schema::expr;
use crate::error::{Error, Result};
use crate::platform::sql::{Clauses, SqlService, Value, qualify};

/// Builds the DDL run when a namespace table is missing.
pub type SetupFn = fn(&str) -> Result<String>;

/// One document table of every namespace.
#[derive(Clone)]
pub struct Documents {
    sql: SqlService,
    table: &'static str,
    setup: SetupFn,
}

impl Documents {
    pub fn new(sql: SqlService, table: &'static str, setup: SetupFn) -> Self {
        Self { sql, table, setup }
    }

    pub fn sql(&self) -> &SqlService {
        &self.sql
    }

    fn table(&self, ns: &str) -> Result<String> {
        qualify(ns, self.table)
    }

    /// Statement inserting a new document.
    pub fn insert_statement<T: Serialize>(&self, ns: &str, doc: &T) -> Result<(String, Vec<Value>)> {
        let table = self.table(ns)?;
        let data = serde_json::to_string(doc)?;
        Ok((format!("INSERT INTO {table} (json_data) VALUES (?)"), vec![Value::Text(data)]))
    }

    /// Statement replacing the document stored under `row_id`.
    pub fn replace_statement<T: Serialize>(&self, ns: &str, row_id: i64, doc: &T) -> Result<(String, Vec<Value>)> {
        let table = self.table(ns)?;
        let data = serde_json::to_string(doc)?;
        Ok((
            format!("UPDATE {table} SET json_data = ? WHERE row_id = ?"),
            vec![Value::Text(data), Value::Integer(row_id)],
        ))
    }

    /// Inserts a new document.
    pub async fn insert<T: Serialize>(&self, ns: &str, doc: &T) -> Result<()> {
        let (sql, params) = self.insert_statement(ns, doc)?;
        self.sql.execute_or_setup(&(self.setup)(ns)?, &sql, &params).await?;
        Ok(())
    }

    /// Replaces the document stored under `row_id`.
    pub async fn replace<T: Serialize>(&self, ns: &str, row_id: i64, doc: &T) -> Result<()> {
        let (sql, params) = self.replace_statement(ns, row_id, doc)?;
        let affected = self.sql.execute_or_setup(&(self.setup)(ns)?, &sql, &params).await?;
        if affected == 0 {
            return Err(Error::not_found(format!("{} row {row_id}", self.table)));
        }
        Ok(())
    }

    /// Runs `statements` in one transaction; nothing is written unless all
    /// succeed.
    pub async fn write_all(&self, ns: &str, statements: Vec<(String, Vec<Value>)>) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        self.sql
            .execute_atomic_or_setup(&(self.setup)(ns)?, statements)
            .await?;
        Ok(())
    }

    /// Documents matching `clauses` with their row ids, newest first.
    pub async fn select_rows<T: DeserializeOwned>(
        &self,
        ns: &str,
        clauses: &Clauses,
        limit: Option<usize>,
    ) -> Result<Vec<(i64, T)>> {
        self.select_ordered(ns, clauses, limit, "DESC").await
    }

    async fn select_ordered<T: DeserializeOwned>(
        &self,
        ns: &str,
        clauses: &Clauses,
        limit: Option<usize>,
        direction: &str,
    ) -> Result<Vec<(i64, T)>> {
        let table = self.table(ns)?;
        let limit = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
        let sql = format!(
            "SELECT row_id, json_data FROM {table}{} ORDER BY {} {direction}, row_id {direction}{limit}",
            clauses.render(),
            expr::CREATED_AT,
        );

        let rows = self
            .sql
            .query_or_setup(&(self.setup)(ns)?, &sql, clauses.params())
            .await?;

        rows.iter()
            .map(|row| -> Result<(i64, T)> {
                let doc = serde_json::from_str(row.text("json_data")?)?;
                Ok((row.integer("row_id")?, doc))
            })
            .collect()
    }

    /// Documents matching `clauses`, newest first.
    pub async fn select<T: DeserializeOwned>(
        &self,
        ns: &str,
        clauses: &Clauses,
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        let rows = self.select_rows(ns, clauses, limit).await?;
        Ok(rows.into_iter().map(|(_, doc)| doc).collect())
    }

    /// Like [`Self::select`], but when the window is bounded by an `after`
    /// cursor the `limit` documents closest to the cursor are taken. The
    /// result is newest first either way.
    pub async fn select_window<T: DeserializeOwned>(
        &self,
        ns: &str,
        clauses: &Clauses,
        limit: Option<usize>,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<T>> {
        if after.is_none() {
            return self.select(ns, clauses, limit).await;
        }
        let rows = self.select_ordered(ns, clauses, limit, "ASC").await?;
        Ok(rows.into_iter().rev().map(|(_, doc)| doc).collect())
    }

    /// Number of rows matching `clauses`.
    pub async fn count(&self, ns: &str, clauses: &Clauses) -> Result<u64> {
        let table = self.table(ns)?;
        let rows = self
            .sql
            .query_or_setup(
                &(self.setup)(ns)?,
                &format!("SELECT COUNT(*) AS n FROM {table}{}", clauses.render()),
                clauses.params(),
            )
            .await?;
        let n = rows.first().map_or(Ok(0), |row| row.integer("n"))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Daily counts of documents created within `[start, end]`.
    pub async fn created_by_day(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DayCount>> {
        self.created_by_day_on(ns, expr::CREATED_AT, start, end).await
    }

    /// Daily counts bucketed on the timestamp expression `created_at`.
    pub async fn created_by_day_on(
        &self,
        ns: &str,
        created_at: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DayCount>> {
        let table = self.table(ns)?;
        let bucket = format!("substr({created_at}, 1, 10)");
        let sql = format!(
            "SELECT {bucket} AS bucket, COUNT(*) AS n FROM {table}
             WHERE {bucket} >= ? AND {bucket} <= ?
             GROUP BY bucket ORDER BY bucket"
        );
        let params = [
            Value::Text(start.format("%Y-%m-%d").to_string()),
            Value::Text(end.format("%Y-%m-%d").to_string()),
        ];

        let rows = self.sql.query_or_setup(&(self.setup)(ns)?, &sql, &params).await?;
        rows.iter()
            .map(|row| -> Result<DayCount> {
                Ok(DayCount {
                    bucket: row.text("bucket")?.to_string(),
                    count: u64::try_from(row.integer("n")?).unwrap_or(0),
                })
            })
            .collect()
    }

    /// Creates the namespace tables.
    pub async fn setup(&self, ns: &str) -> Result<()> {
        self.sql.execute_batch(&(self.setup)(ns)?).await?;
        Ok(())
    }

    /// Drops this table in the namespace.
    pub async fn teardown(&self, ns: &str) -> Result<()> {
        let table = self.table(ns)?;
        self.sql
            .execute_batch(&format!("DROP TABLE IF EXISTS {table}"))
            .await?;
        Ok(())
    }

    /// Fails with [`Error::MissingReference`] unless a user with `id` exists
    /// in the namespace.
    pub async fn ensure_user(&self, ns: &str, id: u64) -> Result<()> {
        let users = qualify(ns, super::schema::USERS)?;
        let rows = self
            .sql
            .query_or_setup(
                &(self.setup)(ns)?,
                &format!("SELECT 1 AS found FROM {users} WHERE {} = ? LIMIT 1", expr::ID),
                &[Value::try_from(id)?],
            )
            .await?;
        if rows.is_empty() {
            return Err(Error::MissingReference(format!("user {id} does not exist")));
        }
        Ok(())
    }
}

/// Adds `expr < cursor` for a `created_at` cursor.
pub fn before(clauses: &mut Clauses, at: Option<DateTime<Utc>>) {
    if let Some(at) = at {
        clauses.less_than(expr::CREATED_AT, super::codec::format_timestamp(&at));
    }
}

/// Adds `expr > cursor` for a `created_at` cursor.
pub fn after(clauses: &mut Clauses, at: Option<DateTime<Utc>>) {
    if let Some(at) = at {
        clauses.greater_than(expr::CREATED_AT, super::codec::format_timestamp(&at));
    }
}

/// Id filter over a document expression.
pub fn ids(clauses: &mut Clauses, expression: &str, ids: &[u64]) -> Result<()> {
    let values = ids
        .iter()
        .map(|id| Value::try_from(*id))
        .collect::<Result<Vec<_>>>()?;
    clauses.any_of(expression, values);
    Ok(())
}
