//! Database initialization
//!
//! Creates the database file and schema on first run; safe to call again on
//! an existing database (idempotent `CREATE TABLE IF NOT EXISTS`).

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create the schema if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_identities_table(pool).await?;
    create_touchpoints_table(pool).await?;
    create_conversions_table(pool).await?;
    Ok(())
}

async fn create_identities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS identities (
            guid TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            merged_into TEXT REFERENCES identities(guid),
            linked_user TEXT,
            ip_address TEXT,
            user_agent TEXT NOT NULL DEFAULT '',
            CHECK (merged_into IS NULL OR merged_into <> guid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_identities_created_at ON identities(created_at)",
    )
    .execute(pool)
    .await?;

    // Safety net for the single-canonical invariant: at most one unmerged
    // identity per linked user
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS unique_canonical_identity_per_user
        ON identities(linked_user)
        WHERE merged_into IS NULL AND linked_user IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_touchpoints_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS touchpoints (
            guid TEXT PRIMARY KEY,
            identity TEXT REFERENCES identities(guid) ON DELETE SET NULL,
            created_at INTEGER NOT NULL,
            url TEXT NOT NULL,
            referrer TEXT NOT NULL DEFAULT '',
            utm_source TEXT NOT NULL DEFAULT '',
            utm_medium TEXT NOT NULL DEFAULT '',
            utm_campaign TEXT NOT NULL DEFAULT '',
            utm_term TEXT NOT NULL DEFAULT '',
            utm_content TEXT NOT NULL DEFAULT '',
            fbclid TEXT NOT NULL DEFAULT '',
            gclid TEXT NOT NULL DEFAULT '',
            msclkid TEXT NOT NULL DEFAULT '',
            ttclid TEXT NOT NULL DEFAULT '',
            li_fat_id TEXT NOT NULL DEFAULT '',
            twclid TEXT NOT NULL DEFAULT '',
            igshid TEXT NOT NULL DEFAULT '',
            ip_address TEXT,
            user_agent TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_touchpoints_identity_created_at ON touchpoints(identity, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_touchpoints_source_medium ON touchpoints(utm_source, utm_medium)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_conversions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversions (
            guid TEXT PRIMARY KEY,
            identity TEXT REFERENCES identities(guid) ON DELETE SET NULL,
            created_at INTEGER NOT NULL,
            event TEXT NOT NULL,
            value TEXT,
            currency TEXT NOT NULL DEFAULT '',
            is_confirmed INTEGER NOT NULL DEFAULT 1,
            custom_data TEXT NOT NULL DEFAULT '{}',
            source_type TEXT,
            source_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversions_identity_created_at ON conversions(identity, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversions_event_created_at ON conversions(event, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
