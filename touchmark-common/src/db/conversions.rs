//! Conversion persistence (append-only ledger)

use crate::db::models::{Conversion, SourceRef};
use crate::time::{from_micros, to_micros};
use crate::{Error, Result};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// Insert a new conversion
///
/// Monetary values are persisted as decimal strings, never binary floats.
pub async fn insert_conversion(pool: &SqlitePool, conversion: &Conversion) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO conversions (
            guid, identity, created_at, event, value, currency,
            is_confirmed, custom_data, source_type, source_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(conversion.guid.to_string())
    .bind(conversion.identity.map(|g| g.to_string()))
    .bind(to_micros(&conversion.created_at))
    .bind(&conversion.event)
    .bind(conversion.value.map(|v| v.to_string()))
    .bind(&conversion.currency)
    .bind(conversion.is_confirmed)
    .bind(conversion.custom_data.to_string())
    .bind(conversion.source_ref.as_ref().map(|s| s.kind.clone()))
    .bind(conversion.source_ref.as_ref().map(|s| s.id.clone()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load conversion by guid
pub async fn get_conversion(pool: &SqlitePool, guid: Uuid) -> Result<Option<Conversion>> {
    let row = sqlx::query(
        r#"
        SELECT guid, identity, created_at, event, value, currency,
               is_confirmed, custom_data, source_type, source_id
        FROM conversions
        WHERE guid = ?
        "#,
    )
    .bind(guid.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| conversion_from_row(&r)).transpose()
}

/// Conversions owned by an identity, newest first
pub async fn list_for_identity(pool: &SqlitePool, identity: Uuid) -> Result<Vec<Conversion>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, identity, created_at, event, value, currency,
               is_confirmed, custom_data, source_type, source_id
        FROM conversions
        WHERE identity = ?
        ORDER BY created_at DESC, guid DESC
        "#,
    )
    .bind(identity.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(conversion_from_row).collect()
}

/// Count conversions owned by an identity
pub async fn count_for_identity(pool: &SqlitePool, identity: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversions WHERE identity = ?")
        .bind(identity.to_string())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Reassign all conversions from one identity to another.
/// Part of a merge transaction; returns the number of rows moved.
pub async fn reassign_conversions(
    conn: &mut SqliteConnection,
    from: Uuid,
    to: Uuid,
) -> Result<u64> {
    let result = sqlx::query("UPDATE conversions SET identity = ? WHERE identity = ?")
        .bind(to.to_string())
        .bind(from.to_string())
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Decode a conversion from a row carrying the standard column names.
/// Also used by the attribution query engine, which selects the same columns.
pub fn conversion_from_row(row: &SqliteRow) -> Result<Conversion> {
    let guid_str: String = row.get("guid");
    let identity: Option<String> = row.get("identity");
    let value: Option<String> = row.get("value");
    let custom_data: String = row.get("custom_data");
    let source_type: Option<String> = row.get("source_type");
    let source_id: Option<String> = row.get("source_id");

    Ok(Conversion {
        guid: super::parse_guid(&guid_str)?,
        identity: identity.as_deref().map(super::parse_guid).transpose()?,
        created_at: from_micros(row.get("created_at"))?,
        event: row.get("event"),
        value: value
            .as_deref()
            .map(|v| {
                Decimal::from_str(v)
                    .map_err(|e| Error::InvalidValue(format!("malformed decimal '{}': {}", v, e)))
            })
            .transpose()?,
        currency: row.get("currency"),
        is_confirmed: row.get("is_confirmed"),
        custom_data: serde_json::from_str(&custom_data)
            .map_err(|e| Error::InvalidValue(format!("malformed custom_data: {}", e)))?,
        source_ref: match (source_type, source_id) {
            (Some(kind), Some(id)) => Some(SourceRef { kind, id }),
            _ => None,
        },
    })
}
