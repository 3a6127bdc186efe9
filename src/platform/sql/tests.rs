//! Tests for the SQL service.

use super::*;
use anyhow::Result;
use tempfile::TempDir;

const SETUP: &str = "CREATE TABLE IF NOT EXISTS app_1_1__notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)";

#[tokio::test]
async fn test_query_roundtrip() -> Result<()> {
    let sql = SqlService::memory()?;
    sql.execute_batch(SETUP).await?;

    sql.execute(
        "INSERT INTO app_1_1__notes (id, body) VALUES (?, ?)",
        &[Value::Integer(1), Value::from("hello")],
    )
    .await?;

    let rows = sql.query("SELECT id, body FROM app_1_1__notes", &[]).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].integer("id")?, 1);
    assert_eq!(rows[0].text("body")?, "hello");
    Ok(())
}

#[tokio::test]
async fn test_missing_table_is_detected() -> Result<()> {
    let sql = SqlService::memory()?;
    let err = sql
        .query("SELECT * FROM app_9_9__notes", &[])
        .await
        .expect_err("table should not exist");
    assert!(is_missing_relation(&err));
    Ok(())
}

#[tokio::test]
async fn test_query_or_setup_heals_namespace() -> Result<()> {
    let sql = SqlService::memory()?;

    let affected = sql
        .execute_or_setup(
            SETUP,
            "INSERT INTO app_1_1__notes (id, body) VALUES (?, ?)",
            &[Value::Integer(7), Value::from("first write")],
        )
        .await?;
    assert_eq!(affected, 1);

    let rows = sql
        .query_or_setup(SETUP, "SELECT body FROM app_1_1__notes WHERE id = ?", &[Value::Integer(7)])
        .await?;
    assert_eq!(rows[0].text("body")?, "first write");
    Ok(())
}

#[tokio::test]
async fn test_atomic_batch_rolls_back() -> Result<()> {
    let sql = SqlService::memory()?;

    let result = sql
        .execute_atomic_or_setup(
            SETUP,
            vec![
                (
                    "INSERT INTO app_1_1__notes (id, body) VALUES (?, ?)".to_string(),
                    vec![Value::Integer(1), Value::from("a")],
                ),
                (
                    "INSERT INTO app_1_1__notes (id, body) VALUES (?, ?)".to_string(),
                    vec![Value::Integer(1), Value::from("duplicate")],
                ),
            ],
        )
        .await;
    let err = result.unwrap_err();
    assert!(is_unique_violation(&err), "{err:#}");
    assert!(!is_missing_relation(&err));

    let rows = sql.query("SELECT id FROM app_1_1__notes", &[]).await?;
    assert!(rows.is_empty());

    let affected = sql
        .execute_atomic_or_setup(
            SETUP,
            vec![
                (
                    "INSERT INTO app_1_1__notes (id, body) VALUES (?, ?)".to_string(),
                    vec![Value::Integer(1), Value::from("a")],
                ),
                (
                    "UPDATE app_1_1__notes SET body = ? WHERE id = ?".to_string(),
                    vec![Value::from("b"), Value::Integer(1)],
                ),
            ],
        )
        .await?;
    assert_eq!(affected, vec![1, 1]);
    Ok(())
}

#[tokio::test]
async fn test_file_database_persists() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("data").join("tapglue.db");

    {
        let sql = SqlService::file(&path)?;
        sql.execute_batch(SETUP).await?;
        sql.execute(
            "INSERT INTO app_1_1__notes (id, body) VALUES (?, ?)",
            &[Value::Integer(3), Value::from("kept")],
        )
        .await?;
    }

    let sql = SqlService::file(&path)?;
    let rows = sql.query("SELECT body FROM app_1_1__notes", &[]).await?;
    assert_eq!(rows[0].text("body")?, "kept");
    Ok(())
}

#[test]
fn test_clauses_render() {
    let mut clauses = Clauses::default();
    assert_eq!(clauses.render(), "");

    clauses
        .eq("enabled", true)
        .any_of("id", [1_i64, 2, 3])
        .any_of("type", Vec::<String>::new());

    assert_eq!(clauses.render(), " WHERE enabled = ? AND id IN (?, ?, ?)");
    assert_eq!(clauses.params().len(), 4);
    assert_eq!(clauses.params()[0], Value::Integer(1));
}

#[test]
fn test_ids_beyond_i64_are_rejected() {
    assert_eq!(Value::try_from(42_u64).ok(), Some(Value::Integer(42)));
    assert_eq!(Value::try_from(i64::MAX as u64).ok(), Some(Value::Integer(i64::MAX)));

    let err = Value::try_from(u64::MAX).unwrap_err();
    assert!(matches!(err, crate::Error::InvalidEntity(_)), "{err}");
}
