//! End-to-end tests against an embedded PostgreSQL server.
//!
//! Run with `cargo test --features test-utils-postgres`; the first run
//! downloads a server binary.

#![cfg(feature = "test-utils-postgres")]

use sqlcmd_pg::test_utils::{setup_postgres_embedded, stop_postgres_embedded};
use sqlcmd_pg::{AsyncDatabaseExecutor, Command, Connection, QueryAndParams, RowValues, SqlcmdPgError};

async fn count_rows(conn: &impl AsyncDatabaseExecutor, table: &str) -> Result<i64, SqlcmdPgError> {
    let result = conn
        .execute_select(&format!("SELECT COUNT(id) AS count FROM {table}"), &[])
        .await?;
    let count = result.results[0]
        .get("count")
        .and_then(RowValues::as_int)
        .ok_or_else(|| SqlcmdPgError::ExecutionError("missing count".to_string()))?;
    Ok(*count)
}

#[tokio::test]
async fn persons_example_count_and_lookup() -> Result<(), Box<dyn std::error::Error>> {
    let (server, cfg) = setup_postgres_embedded("sqlcmd_database").await?;
    let db = Connection::new(cfg)?;

    db.execute_batch("CREATE TABLE person (id SERIAL PRIMARY KEY, name TEXT, age INTEGER)")
        .await?;

    let insert = "INSERT INTO person (name, age) VALUES ($name, $age)";
    for i in 0..98i64 {
        let command = Command::new(insert)
            .param("name", format!("Person {i}"))
            .param("age", 20 + (i % 50));
        db.execute_command(&command).await?;
    }
    db.execute_command(&Command::new(insert).param("name", "Brown").param("age", 32i64))
        .await?;
    db.execute_command(&Command::new(insert).param("name", "Smith").param("age", 47i64))
        .await?;

    assert_eq!(count_rows(&db, "person").await?, 100);

    let result = db
        .execute_command(
            &Command::new("SELECT * FROM person WHERE name = $name").param("name", "Brown"),
        )
        .await?;
    assert_eq!(result.results.len(), 1);
    assert_eq!(
        result.results[0].get("age").and_then(RowValues::as_int),
        Some(&32)
    );

    db.close();
    stop_postgres_embedded(server).await;
    Ok(())
}

#[tokio::test]
async fn database_lifecycle_helpers() -> Result<(), Box<dyn std::error::Error>> {
    let (server, mut cfg) = setup_postgres_embedded("bootstrap_db").await?;
    cfg.dbname = Some("sqlcmd_lifecycle".to_string());
    let db = Connection::new(cfg)?;

    assert!(!db.database_exists().await?);
    // dropping a missing database reports "not dropped" without error
    assert!(!db.drop_database_if_exists().await?);

    assert!(db.create_database_if_not_exists().await?);
    assert!(db.database_exists().await?);
    // creating an existing database reports "not created" and leaves it intact
    assert!(!db.create_database_if_not_exists().await?);
    assert!(db.database_exists().await?);

    assert!(db.drop_database_if_exists().await?);
    assert!(!db.database_exists().await?);

    stop_postgres_embedded(server).await;
    Ok(())
}

#[tokio::test]
async fn dml_reports_affected_rows() -> Result<(), Box<dyn std::error::Error>> {
    let (server, cfg) = setup_postgres_embedded("sqlcmd_dml").await?;
    let db = Connection::new(cfg)?;

    db.execute_batch("CREATE TABLE event (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL)")
        .await?;
    let insert = QueryAndParams::new(
        "INSERT INTO event (name) VALUES ($1), ($2)",
        vec![
            RowValues::Text("created".to_string()),
            RowValues::Text("updated".to_string()),
        ],
    );
    let inserted = db.execute(&insert.query, &insert.params).await?;
    assert_eq!(inserted, 2);
    assert_eq!(count_rows(&db, "event").await?, 2);

    let deleted = db.execute("DELETE FROM event", &[]).await?;
    assert_eq!(deleted, 2);

    stop_postgres_embedded(server).await;
    Ok(())
}
