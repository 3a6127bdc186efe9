//! SQLite backend.
//!
//! One connection guarded by a mutex; every call runs on the blocking pool so
//! the async runtime never waits on disk I/O.

use super::backend::SqlBackend;
use super::types::{Row, Value};
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

/// SQLite-backed [`SqlBackend`].
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Opens (or creates) a database file.
    ///
    /// Enables WAL so the API server and the SIMS worker can share the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("Failed to configure SQLite connection")?;

        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .context("SQLite worker task failed")?
    }
}

fn bind(params: &[Value]) -> Vec<rusqlite::types::Value> {
    params.iter().map(Value::to_rusqlite).collect()
}

#[async_trait]
impl SqlBackend for SqliteBackend {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let params = bind(params);

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(ToString::to_string)
                .collect();

            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns.len());
                for idx in 0..columns.len() {
                    values.push(Value::from(row.get_ref(idx)?));
                }
                out.push(Row::new(columns.clone(), values));
            }
            Ok(out)
        })
        .await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let sql = sql.to_string();
        let params = bind(params);

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            Ok(stmt.execute(rusqlite::params_from_iter(params.iter()))?)
        })
        .await
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.with_conn(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }

    async fn execute_batch_atomic(
        &self,
        statements: Vec<(String, Vec<Value>)>,
    ) -> Result<Vec<usize>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut affected = Vec::with_capacity(statements.len());
            for (sql, params) in &statements {
                let params = bind(params);
                affected.push(tx.execute(sql, rusqlite::params_from_iter(params.iter()))?);
            }
            tx.commit()?;
            Ok(affected)
        })
        .await
    }
}
