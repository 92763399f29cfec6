//! Unit tests for database initialization and graceful degradation

use std::path::PathBuf;
use touchmark_common::db::init_database;

fn temp_db_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = temp_db_path(&dir, "touchmark.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = temp_db_path(&dir, "touchmark.db");

    let pool1 = init_database(&db_path).await.unwrap();
    drop(pool1);

    // Re-running schema creation against an existing database is a no-op
    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_parent_directory_created() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("deeper").join("touchmark.db");

    init_database(&db_path).await.unwrap();
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_schema_tables_exist() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = temp_db_path(&dir, "touchmark.db");

    let pool = init_database(&db_path).await.unwrap();

    for table in ["identities", "touchpoints", "conversions"] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "table {} missing", table);
    }

    let index_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'unique_canonical_identity_per_user'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(index_count, 1, "partial unique index missing");
}
