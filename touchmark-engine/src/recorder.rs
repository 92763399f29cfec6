//! Conversion recording
//!
//! Validates a business event against the caller's declared scope and
//! persists it against the resolved identity. The scope is an explicit value
//! threaded from request entry to the recording call; there is no ambient
//! per-request state to leak between requests.

use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::collections::HashSet;
use touchmark_common::db::{self, Conversion, Identity, SourceRef};
use touchmark_common::{AttributionConfig, Error, Result};
use tracing::{info, warn};

/// Caller-declared recording policy for one request scope
#[derive(Debug, Clone)]
pub struct ConversionScope {
    /// When set, only these event names may be recorded
    pub allowed_events: Option<HashSet<String>>,
    /// When true, recording without a resolved identity is skipped
    pub require_identity: bool,
}

impl Default for ConversionScope {
    fn default() -> Self {
        Self {
            allowed_events: None,
            require_identity: true,
        }
    }
}

impl ConversionScope {
    /// Scope restricted to the given event names
    pub fn allowing<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_events: Some(events.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Scope with no allow-list
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Allow recording events without a resolved identity
    pub fn with_optional_identity(mut self) -> Self {
        self.require_identity = false;
        self
    }
}

/// Optional attributes of a conversion being recorded
#[derive(Debug, Clone)]
pub struct RecordConversion {
    pub value: Option<Decimal>,
    /// Defaults to the configured currency when absent
    pub currency: Option<String>,
    pub is_confirmed: bool,
    pub custom_data: Option<serde_json::Value>,
    pub source_ref: Option<SourceRef>,
}

impl Default for RecordConversion {
    fn default() -> Self {
        Self {
            value: None,
            currency: None,
            is_confirmed: true,
            custom_data: None,
            source_ref: None,
        }
    }
}

impl RecordConversion {
    pub fn with_value(mut self, value: Decimal) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn unconfirmed(mut self) -> Self {
        self.is_confirmed = false;
        self
    }

    pub fn with_custom_data(mut self, data: serde_json::Value) -> Self {
        self.custom_data = Some(data);
        self
    }

    pub fn with_source_ref(mut self, source_ref: SourceRef) -> Self {
        self.source_ref = Some(source_ref);
        self
    }
}

/// Outcome of a recording attempt that did not fail validation
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Recorded(Conversion),
    /// Identity required by the scope but absent; explicitly not an error
    SkippedNoIdentity,
}

impl RecordOutcome {
    pub fn recorded(self) -> Option<Conversion> {
        match self {
            RecordOutcome::Recorded(conversion) => Some(conversion),
            RecordOutcome::SkippedNoIdentity => None,
        }
    }
}

/// Validate and persist one business event against the resolved identity.
///
/// An event outside an active allow-list is an `EventNotAllowed` error and
/// persists nothing. A missing identity under `require_identity` is a
/// `SkippedNoIdentity` outcome; callers must check for it.
pub async fn record_conversion(
    pool: &SqlitePool,
    config: &AttributionConfig,
    scope: &ConversionScope,
    identity: Option<&Identity>,
    event: &str,
    attributes: RecordConversion,
) -> Result<RecordOutcome> {
    if let Some(allowed) = &scope.allowed_events {
        if !allowed.contains(event) {
            let mut allowed: Vec<String> = allowed.iter().cloned().collect();
            allowed.sort();
            warn!(
                event,
                ?allowed,
                "Attempted to record conversion not declared in allowed events"
            );
            return Err(Error::EventNotAllowed {
                event: event.to_string(),
                allowed,
            });
        }
    }

    let Some(identity) = identity else {
        if scope.require_identity {
            warn!(event, "Cannot record conversion: identity required but not resolved");
            return Ok(RecordOutcome::SkippedNoIdentity);
        }

        let conversion = build_conversion(None, event, config, attributes);
        db::conversions::insert_conversion(pool, &conversion).await?;
        info!(event, "Recorded conversion for anonymous visitor");
        return Ok(RecordOutcome::Recorded(conversion));
    };

    let conversion = build_conversion(Some(identity), event, config, attributes);
    db::conversions::insert_conversion(pool, &conversion).await?;
    info!(event, identity = %identity.guid, "Recorded conversion");
    Ok(RecordOutcome::Recorded(conversion))
}

fn build_conversion(
    identity: Option<&Identity>,
    event: &str,
    config: &AttributionConfig,
    attributes: RecordConversion,
) -> Conversion {
    let currency = attributes
        .currency
        .unwrap_or_else(|| config.default_currency.clone());

    let mut conversion = Conversion::new(identity.map(|i| i.guid), event, currency);
    conversion.value = attributes.value;
    conversion.is_confirmed = attributes.is_confirmed;
    if let Some(data) = attributes.custom_data {
        conversion.custom_data = data;
    }
    conversion.source_ref = attributes.source_ref;
    conversion
}
