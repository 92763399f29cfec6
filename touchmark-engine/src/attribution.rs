//! Attribution-window query engine
//!
//! Annotates a batch of conversions with the touchpoint that receives credit
//! under a first-touch or last-touch policy, as one set-oriented SQL
//! statement rather than a query per conversion.
//!
//! Eligibility per conversion: same identity, strictly earlier than the
//! conversion, and within the applicable lookback window. The window is the
//! per-source override for the touchpoint's utm_source when one is
//! configured, else the default; membership is inclusive at the lower bound
//! (`touchpoint.created_at >= conversion.created_at - window`).
//!
//! Timestamp ties are broken by touchpoint guid (text ordering): the higher
//! guid wins under last-touch, the lower under first-touch. Deterministic by
//! construction, not left to index order.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use touchmark_common::db::{conversions, Conversion};
use touchmark_common::time::{from_micros, MICROS_PER_DAY};
use touchmark_common::{AttributionConfig, Error, Result};
use uuid::Uuid;

/// Which touchpoint in the eligible set receives credit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionPolicy {
    FirstTouch,
    LastTouch,
}

impl AttributionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionPolicy::FirstTouch => "first_touch",
            AttributionPolicy::LastTouch => "last_touch",
        }
    }
}

/// A first-touch or last-touch attribution query with window configuration
#[derive(Debug, Clone)]
pub struct AttributionQuery {
    policy: AttributionPolicy,
    window_days: i64,
    source_overrides: BTreeMap<String, i64>,
}

/// Audit record of the policy and windows that produced a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionMetadata {
    pub policy: AttributionPolicy,
    pub window_days: i64,
    pub source_overrides: BTreeMap<String, i64>,
}

/// Tracking-parameter fields of the credited touchpoint
#[derive(Debug, Clone, PartialEq)]
pub struct AttributedTouchpoint {
    pub guid: Uuid,
    pub created_at: DateTime<Utc>,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub utm_term: String,
    pub utm_content: String,
    pub fbclid: String,
    pub gclid: String,
    pub msclkid: String,
    pub ttclid: String,
    pub li_fat_id: String,
    pub twclid: String,
    pub igshid: String,
}

/// One conversion annotated with its credited touchpoint (if any) and the
/// metadata describing how credit was assigned
#[derive(Debug, Clone)]
pub struct AttributedConversion {
    pub conversion: Conversion,
    pub touchpoint: Option<AttributedTouchpoint>,
    pub metadata: AttributionMetadata,
}

impl AttributedConversion {
    pub fn attributed_source(&self) -> Option<&str> {
        self.touchpoint.as_ref().map(|t| t.utm_source.as_str())
    }

    pub fn attributed_medium(&self) -> Option<&str> {
        self.touchpoint.as_ref().map(|t| t.utm_medium.as_str())
    }

    pub fn attributed_campaign(&self) -> Option<&str> {
        self.touchpoint.as_ref().map(|t| t.utm_campaign.as_str())
    }
}

impl AttributionQuery {
    pub fn last_touch(window_days: i64) -> Self {
        Self::new(AttributionPolicy::LastTouch, window_days)
    }

    pub fn first_touch(window_days: i64) -> Self {
        Self::new(AttributionPolicy::FirstTouch, window_days)
    }

    pub fn new(policy: AttributionPolicy, window_days: i64) -> Self {
        Self {
            policy,
            window_days,
            source_overrides: BTreeMap::new(),
        }
    }

    /// Query configured from the engine's defaults and per-source overrides
    pub fn from_config(policy: AttributionPolicy, config: &AttributionConfig) -> Self {
        Self {
            policy,
            window_days: config.default_window_days,
            source_overrides: config.source_window_overrides.clone(),
        }
    }

    /// Override the lookback window for one traffic source
    pub fn with_source_override(mut self, source: impl Into<String>, days: i64) -> Self {
        self.source_overrides.insert(source.into(), days);
        self
    }

    /// Annotate the given conversions in one bulk query.
    ///
    /// Conversions with no eligible touchpoint come back with
    /// `touchpoint: None`; that is a result, not an error. Results are
    /// ordered by conversion creation time (guid tie-break).
    pub async fn apply(
        &self,
        pool: &SqlitePool,
        conversion_ids: &[Uuid],
    ) -> Result<Vec<AttributedConversion>> {
        if conversion_ids.is_empty() {
            return Ok(Vec::new());
        }

        let order = match self.policy {
            AttributionPolicy::LastTouch => "DESC",
            AttributionPolicy::FirstTouch => "ASC",
        };

        // Applicable window per candidate touchpoint, in microseconds
        let window_expr = if self.source_overrides.is_empty() {
            "?".to_string()
        } else {
            let mut expr = String::from("CASE t2.utm_source ");
            for _ in &self.source_overrides {
                expr.push_str("WHEN ? THEN ? ");
            }
            expr.push_str("ELSE ? END");
            expr
        };

        let id_placeholders = vec!["?"; conversion_ids.len()].join(", ");

        let sql = format!(
            r#"
            SELECT c.guid, c.identity, c.created_at, c.event, c.value, c.currency,
                   c.is_confirmed, c.custom_data, c.source_type, c.source_id,
                   t.guid AS tp_guid, t.created_at AS tp_created_at,
                   t.utm_source AS tp_utm_source, t.utm_medium AS tp_utm_medium,
                   t.utm_campaign AS tp_utm_campaign, t.utm_term AS tp_utm_term,
                   t.utm_content AS tp_utm_content, t.fbclid AS tp_fbclid,
                   t.gclid AS tp_gclid, t.msclkid AS tp_msclkid,
                   t.ttclid AS tp_ttclid, t.li_fat_id AS tp_li_fat_id,
                   t.twclid AS tp_twclid, t.igshid AS tp_igshid
            FROM conversions c
            LEFT JOIN touchpoints t ON t.guid = (
                SELECT t2.guid
                FROM touchpoints t2
                WHERE c.identity IS NOT NULL
                  AND t2.identity = c.identity
                  AND t2.created_at < c.created_at
                  AND t2.created_at >= c.created_at - ({window_expr})
                ORDER BY t2.created_at {order}, t2.guid {order}
                LIMIT 1
            )
            WHERE c.guid IN ({id_placeholders})
            ORDER BY c.created_at ASC, c.guid ASC
            "#
        );

        let mut query = sqlx::query(&sql);
        for (source, days) in &self.source_overrides {
            query = query.bind(source).bind(days * MICROS_PER_DAY);
        }
        query = query.bind(self.window_days * MICROS_PER_DAY);
        for guid in conversion_ids {
            query = query.bind(guid.to_string());
        }

        let rows = query.fetch_all(pool).await?;
        rows.iter().map(|row| self.attributed_from_row(row)).collect()
    }

    /// Annotate every conversion recorded under an event name
    pub async fn apply_for_event(
        &self,
        pool: &SqlitePool,
        event: &str,
    ) -> Result<Vec<AttributedConversion>> {
        let guids: Vec<String> =
            sqlx::query_scalar("SELECT guid FROM conversions WHERE event = ?")
                .bind(event)
                .fetch_all(pool)
                .await?;

        let ids = guids
            .iter()
            .map(|g| {
                Uuid::parse_str(g)
                    .map_err(|e| Error::InvalidValue(format!("malformed guid '{}': {}", g, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        self.apply(pool, &ids).await
    }

    fn metadata(&self) -> AttributionMetadata {
        AttributionMetadata {
            policy: self.policy,
            window_days: self.window_days,
            source_overrides: self.source_overrides.clone(),
        }
    }

    fn attributed_from_row(&self, row: &SqliteRow) -> Result<AttributedConversion> {
        let conversion = conversions::conversion_from_row(row)?;

        let tp_guid: Option<String> = row.get("tp_guid");
        let touchpoint = tp_guid
            .map(|guid| -> Result<AttributedTouchpoint> {
                Ok(AttributedTouchpoint {
                    guid: Uuid::parse_str(&guid)
                        .map_err(|e| Error::InvalidValue(format!("malformed guid '{}': {}", guid, e)))?,
                    created_at: from_micros(row.get("tp_created_at"))?,
                    utm_source: row.get("tp_utm_source"),
                    utm_medium: row.get("tp_utm_medium"),
                    utm_campaign: row.get("tp_utm_campaign"),
                    utm_term: row.get("tp_utm_term"),
                    utm_content: row.get("tp_utm_content"),
                    fbclid: row.get("tp_fbclid"),
                    gclid: row.get("tp_gclid"),
                    msclkid: row.get("tp_msclkid"),
                    ttclid: row.get("tp_ttclid"),
                    li_fat_id: row.get("tp_li_fat_id"),
                    twclid: row.get("tp_twclid"),
                    igshid: row.get("tp_igshid"),
                })
            })
            .transpose()?;

        Ok(AttributedConversion {
            conversion,
            touchpoint,
            metadata: self.metadata(),
        })
    }
}
