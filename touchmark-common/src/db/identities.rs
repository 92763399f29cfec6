//! Identity persistence

use crate::db::models::Identity;
use crate::time::{from_micros, to_micros};
use crate::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

/// Insert a new identity
pub async fn insert_identity(pool: &SqlitePool, identity: &Identity) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO identities (guid, created_at, merged_into, linked_user, ip_address, user_agent)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(identity.guid.to_string())
    .bind(to_micros(&identity.created_at))
    .bind(identity.merged_into.map(|g| g.to_string()))
    .bind(&identity.linked_user)
    .bind(&identity.ip_address)
    .bind(&identity.user_agent)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load identity by guid
pub async fn get_identity(pool: &SqlitePool, guid: Uuid) -> Result<Option<Identity>> {
    let row = sqlx::query(
        r#"
        SELECT guid, created_at, merged_into, linked_user, ip_address, user_agent
        FROM identities
        WHERE guid = ?
        "#,
    )
    .bind(guid.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| identity_from_row(&r)).transpose()
}

/// Unmerged identities linked to a user, oldest first (guid tie-break)
pub async fn find_unmerged_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Identity>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, created_at, merged_into, linked_user, ip_address, user_agent
        FROM identities
        WHERE linked_user = ? AND merged_into IS NULL
        ORDER BY created_at ASC, guid ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(identity_from_row).collect()
}

/// Link an identity to an authenticated user
pub async fn link_user(pool: &SqlitePool, guid: Uuid, user_id: &str) -> Result<()> {
    sqlx::query("UPDATE identities SET linked_user = ? WHERE guid = ?")
        .bind(user_id)
        .bind(guid.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Mark an identity as merged into a target, mirroring the target's user link
/// onto the tombstone. Part of a merge transaction.
pub async fn mark_merged(
    conn: &mut SqliteConnection,
    source: Uuid,
    target: Uuid,
    linked_user: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE identities SET merged_into = ?, linked_user = ? WHERE guid = ?")
        .bind(target.to_string())
        .bind(linked_user)
        .bind(source.to_string())
        .execute(conn)
        .await?;

    Ok(())
}

/// Clear an identity's merge pointer, making it canonical again.
/// Used by cycle healing, inside the healing transaction.
pub async fn clear_merged_into(conn: &mut SqliteConnection, guid: Uuid) -> Result<()> {
    sqlx::query("UPDATE identities SET merged_into = NULL WHERE guid = ?")
        .bind(guid.to_string())
        .execute(conn)
        .await?;

    Ok(())
}

fn identity_from_row(row: &SqliteRow) -> Result<Identity> {
    let guid_str: String = row.get("guid");
    let merged_into: Option<String> = row.get("merged_into");

    Ok(Identity {
        guid: super::parse_guid(&guid_str)?,
        created_at: from_micros(row.get("created_at"))?,
        merged_into: merged_into.as_deref().map(super::parse_guid).transpose()?,
        linked_user: row.get("linked_user"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
    })
}
