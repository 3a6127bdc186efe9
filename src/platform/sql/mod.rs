//! Embedded SQL access shared by every storage service.
//!
//! A [`SqlService`] wraps a pluggable [`SqlBackend`] (SQLite by default) and
//! adds namespace self-healing: storage services pass the DDL of their
//! namespace along with a statement, and a statement failing because a table
//! of the namespace does not exist yet runs the DDL once and is retried.
//! Tenants are therefore created lazily on their first write.
//!
//! # Example
//!
//! ```ignore
//! use tapglue::platform::sql::{Clauses, SqlService, Value};
//!
//! let sql = SqlService::memory()?;
//! let setup = "CREATE TABLE IF NOT EXISTS app_1_1__users (id INTEGER PRIMARY KEY, json_data TEXT NOT NULL)";
//!
//! let mut clauses = Clauses::default();
//! clauses.any_of("id", [Value::Integer(1), Value::Integer(2)]);
//!
//! let rows = sql
//!     .query_or_setup(setup, &format!("SELECT json_data FROM app_1_1__users{}", clauses.render()), clauses.params())
//!     .await?;
//! ```

mod backend;
mod clauses;
mod namespace;
mod service;
mod sqlite;
mod types;

#[cfg(test)]
mod tests;

pub use backend::SqlBackend;
pub use clauses::Clauses;
pub use namespace::{is_missing_relation, is_unique_violation, qualify, validate_namespace};
pub use service::SqlService;
pub use sqlite::SqliteBackend;
pub use types::{Row, Value};
