//! Shared helpers for touchmark-engine integration tests
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use touchmark_common::db::{self, create_schema, Conversion, Identity, Touchpoint};
use touchmark_engine::AttributionEngine;
use touchmark_common::AttributionConfig;
use uuid::Uuid;

/// In-memory database with the full schema.
/// Single connection so every query sees the same memory database.
pub async fn memory_pool() -> SqlitePool {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();
    pool
}

pub fn engine(pool: &SqlitePool) -> AttributionEngine {
    AttributionEngine::new(pool.clone(), AttributionConfig::default())
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// Insert an identity created at a specific instant
pub async fn identity_at(pool: &SqlitePool, created_at: DateTime<Utc>) -> Identity {
    let mut identity = Identity::new(None, "");
    identity.created_at = created_at;
    db::identities::insert_identity(pool, &identity).await.unwrap();
    identity
}

/// Insert a touchpoint for an identity with a utm_source and creation time
pub async fn touchpoint_at(
    pool: &SqlitePool,
    identity: Uuid,
    source: &str,
    created_at: DateTime<Utc>,
) -> Touchpoint {
    let mut tp = Touchpoint::new(identity, "https://shop.example.com/landing", "", None, "");
    tp.created_at = created_at;
    tp.utm_source = source.to_string();
    db::touchpoints::insert_touchpoint(pool, &tp).await.unwrap();
    tp
}

/// Insert a conversion for an identity at a creation time
pub async fn conversion_at(
    pool: &SqlitePool,
    identity: Option<Uuid>,
    event: &str,
    created_at: DateTime<Utc>,
) -> Conversion {
    let mut conversion = Conversion::new(identity, event, "EUR");
    conversion.created_at = created_at;
    db::conversions::insert_conversion(pool, &conversion).await.unwrap();
    conversion
}

pub async fn count_identities(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM identities")
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn count_touchpoints(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM touchpoints")
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn count_conversions(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM conversions")
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Force a raw merge pointer, bypassing the merge workflow.
/// Used to fabricate corrupt states (cycles, long chains) for healing tests.
pub async fn force_merged_into(pool: &SqlitePool, identity: Uuid, target: Option<Uuid>) {
    sqlx::query("UPDATE identities SET merged_into = ? WHERE guid = ?")
        .bind(target.map(|g| g.to_string()))
        .bind(identity.to_string())
        .execute(pool)
        .await
        .unwrap();
}
