//! Touchpoint persistence

use crate::db::models::Touchpoint;
use crate::time::{from_micros, to_micros};
use crate::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Insert a new touchpoint
pub async fn insert_touchpoint(pool: &SqlitePool, touchpoint: &Touchpoint) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO touchpoints (
            guid, identity, created_at, url, referrer,
            utm_source, utm_medium, utm_campaign, utm_term, utm_content,
            fbclid, gclid, msclkid, ttclid, li_fat_id, twclid, igshid,
            ip_address, user_agent
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(touchpoint.guid.to_string())
    .bind(touchpoint.identity.map(|g| g.to_string()))
    .bind(to_micros(&touchpoint.created_at))
    .bind(&touchpoint.url)
    .bind(&touchpoint.referrer)
    .bind(&touchpoint.utm_source)
    .bind(&touchpoint.utm_medium)
    .bind(&touchpoint.utm_campaign)
    .bind(&touchpoint.utm_term)
    .bind(&touchpoint.utm_content)
    .bind(&touchpoint.fbclid)
    .bind(&touchpoint.gclid)
    .bind(&touchpoint.msclkid)
    .bind(&touchpoint.ttclid)
    .bind(&touchpoint.li_fat_id)
    .bind(&touchpoint.twclid)
    .bind(&touchpoint.igshid)
    .bind(&touchpoint.ip_address)
    .bind(&touchpoint.user_agent)
    .execute(pool)
    .await?;

    Ok(())
}

/// Touchpoints owned by an identity, newest first
pub async fn list_for_identity(pool: &SqlitePool, identity: Uuid) -> Result<Vec<Touchpoint>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, identity, created_at, url, referrer,
               utm_source, utm_medium, utm_campaign, utm_term, utm_content,
               fbclid, gclid, msclkid, ttclid, li_fat_id, twclid, igshid,
               ip_address, user_agent
        FROM touchpoints
        WHERE identity = ?
        ORDER BY created_at DESC, guid DESC
        "#,
    )
    .bind(identity.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(touchpoint_from_row).collect()
}

/// Count touchpoints owned by an identity
pub async fn count_for_identity(pool: &SqlitePool, identity: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM touchpoints WHERE identity = ?")
        .bind(identity.to_string())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Reassign all touchpoints from one identity to another.
/// Part of a merge transaction; returns the number of rows moved.
pub async fn reassign_touchpoints(
    conn: &mut SqliteConnection,
    from: Uuid,
    to: Uuid,
) -> Result<u64> {
    let result = sqlx::query("UPDATE touchpoints SET identity = ? WHERE identity = ?")
        .bind(to.to_string())
        .bind(from.to_string())
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

fn touchpoint_from_row(row: &SqliteRow) -> Result<Touchpoint> {
    let guid_str: String = row.get("guid");
    let identity: Option<String> = row.get("identity");

    Ok(Touchpoint {
        guid: super::parse_guid(&guid_str)?,
        identity: identity.as_deref().map(super::parse_guid).transpose()?,
        created_at: from_micros(row.get("created_at"))?,
        url: row.get("url"),
        referrer: row.get("referrer"),
        utm_source: row.get("utm_source"),
        utm_medium: row.get("utm_medium"),
        utm_campaign: row.get("utm_campaign"),
        utm_term: row.get("utm_term"),
        utm_content: row.get("utm_content"),
        fbclid: row.get("fbclid"),
        gclid: row.get("gclid"),
        msclkid: row.get("msclkid"),
        ttclid: row.get("ttclid"),
        li_fat_id: row.get("li_fat_id"),
        twclid: row.get("twclid"),
        igshid: row.get("igshid"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
    })
}
