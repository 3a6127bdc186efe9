//! High-level `SqlService` wrapper over backend implementations.

use super::backend::SqlBackend;
use super::namespace::is_missing_relation;
use super::sqlite::SqliteBackend;
use super::types::{Row, Value};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// High-level SQL service interface.
///
/// `SqlService` is `Clone` and shared by every storage service; the backend
/// serialises access to the underlying connection.
#[derive(Clone)]
pub struct SqlService {
    backend: Arc<dyn SqlBackend>,
}

impl SqlService {
    /// Creates a service backed by a SQLite database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::custom(SqliteBackend::open(path)?))
    }

    /// Creates a service backed by an in-memory SQLite database.
    ///
    /// All data is lost when the service is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn memory() -> Result<Self> {
        Ok(Self::custom(SqliteBackend::memory()?))
    }

    /// Creates a service with a custom backend.
    pub fn custom<B: SqlBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Executes a statement returning rows.
    ///
    /// # Errors
    ///
    /// Returns an error if query execution fails.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.backend.query(sql, params).await
    }

    /// Executes an INSERT, UPDATE, or DELETE statement.
    ///
    /// # Errors
    ///
    /// Returns an error if statement execution fails.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.backend.execute(sql, params).await
    }

    /// Executes multiple SQL statements in a batch.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.backend.execute_batch(sql).await
    }

    /// Like [`Self::query`], running `setup` and retrying once when a table
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the error of the setup or of the retried statement.
    pub async fn query_or_setup(&self, setup: &str, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        match self.backend.query(sql, params).await {
            Err(err) if is_missing_relation(&err) => {
                self.heal(setup, &err).await?;
                self.backend.query(sql, params).await
            },
            result => result,
        }
    }

    /// Like [`Self::execute`], running `setup` and retrying once when a table
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the error of the setup or of the retried statement.
    pub async fn execute_or_setup(&self, setup: &str, sql: &str, params: &[Value]) -> Result<usize> {
        match self.backend.execute(sql, params).await {
            Err(err) if is_missing_relation(&err) => {
                self.heal(setup, &err).await?;
                self.backend.execute(sql, params).await
            },
            result => result,
        }
    }

    /// Runs `statements` in one transaction, rolled back as a whole when any
    /// statement fails, with the same self-healing retry.
    ///
    /// # Errors
    ///
    /// Returns the error of the setup or of the retried transaction.
    pub async fn execute_atomic_or_setup(
        &self,
        setup: &str,
        statements: Vec<(String, Vec<Value>)>,
    ) -> Result<Vec<usize>> {
        match self.backend.execute_batch_atomic(statements.clone()).await {
            Err(err) if is_missing_relation(&err) => {
                self.heal(setup, &err).await?;
                self.backend.execute_batch_atomic(statements).await
            },
            result => result,
        }
    }

    async fn heal(&self, setup: &str, cause: &anyhow::Error) -> Result<()> {
        info!(target: "service", cause = %cause, "namespace missing, running setup");
        self.backend.execute_batch(setup).await
    }
}
