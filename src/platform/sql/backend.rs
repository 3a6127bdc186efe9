//! Backend trait for the SQL service.
//!
//! Defines the interface every relational backend implements so the storage
//! services stay independent of the concrete driver.

use super::types::{Row, Value};
use anyhow::Result;
use async_trait::async_trait;

/// Backend trait for SQL storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Driver errors are returned verbatim (wrapped in `anyhow`) so callers can
/// inspect them, e.g. with [`super::is_missing_relation`].
#[async_trait]
pub trait SqlBackend: Send + Sync + 'static {
    /// Executes a statement returning rows (SELECT, or DML with RETURNING).
    ///
    /// Parameters are bound in order using `?` placeholders.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Query preparation fails (SQL syntax error, missing table)
    /// - Query execution or result fetching fails
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Executes an INSERT, UPDATE, or DELETE statement.
    ///
    /// Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement execution fails (constraint violation, SQL error).
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Executes multiple SQL statements separated by semicolons.
    ///
    /// Does not support parameters, use only with trusted SQL such as the
    /// namespace DDL.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement in the batch fails to execute.
    async fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Executes multiple statements atomically in a transaction.
    ///
    /// All statements succeed or all are rolled back. Returns the number of
    /// rows affected by each statement in order.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails. On error, all changes are rolled back.
    async fn execute_batch_atomic(
        &self,
        statements: Vec<(String, Vec<Value>)>,
    ) -> Result<Vec<usize>>;
}
