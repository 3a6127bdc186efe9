//! Namespace naming and classification of driver errors.

use crate::error::{Error, Result};

const MAX_NAMESPACE_LEN: usize = 48;

/// Checks that `ns` is a safe tenant identifier (`[a-z][a-z0-9_]*`).
///
/// Namespaces end up in table names, so anything else is rejected.
///
/// # Errors
///
/// Returns [`Error::InvalidNamespace`] for empty, overlong or unsafe names.
pub fn validate_namespace(ns: &str) -> Result<()> {
    let mut chars = ns.chars();
    let valid_head = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let valid_tail = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid_head || !valid_tail || ns.len() > MAX_NAMESPACE_LEN || ns.contains("__") {
        return Err(Error::InvalidNamespace(ns.to_string()));
    }
    Ok(())
}

/// Table name of `table` inside namespace `ns`, e.g. `app_42_7__users`.
///
/// # Errors
///
/// Returns [`Error::InvalidNamespace`] when `ns` is not a valid namespace.
pub fn qualify(ns: &str, table: &str) -> Result<String> {
    validate_namespace(ns)?;
    Ok(format!("{ns}__{table}"))
}

/// Reports whether a driver error means a table does not exist yet.
pub fn is_missing_relation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(rusqlite::Error::SqliteFailure(_, Some(msg))) =
            cause.downcast_ref::<rusqlite::Error>()
        {
            return msg.starts_with("no such table");
        }
        cause.to_string().starts_with("no such table")
    })
}

/// Reports whether a driver error is a violated unique index or primary key.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(rusqlite::Error::SqliteFailure(failure, _)) = cause.downcast_ref::<rusqlite::Error>() {
            return matches!(
                failure.extended_code,
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            );
        }
        cause.to_string().starts_with("UNIQUE constraint failed")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_namespace() {
        assert!(validate_namespace("app_42_7").is_ok());
        assert!(validate_namespace("tg").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("42_app").is_err());
        assert!(validate_namespace("app;drop").is_err());
        assert!(validate_namespace("App_1").is_err());
        assert!(validate_namespace("a__b").is_err());
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("app_1_2", "users").unwrap(), "app_1_2__users");
    }
}
