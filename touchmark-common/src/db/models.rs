//! Database models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

/// Visitor identity record
///
/// `merged_into` is an optional reference by id, not an owning pointer;
/// merged identities persist as tombstones pointing at their successor.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub guid: Uuid,
    pub created_at: DateTime<Utc>,
    pub merged_into: Option<Uuid>,
    pub linked_user: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl Identity {
    /// Create a new anonymous identity with first-seen client details
    pub fn new(ip_address: Option<String>, user_agent: impl Into<String>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            created_at: crate::time::now(),
            merged_into: None,
            linked_user: None,
            ip_address,
            user_agent: user_agent.into(),
        }
    }

    /// Create a new identity already linked to an authenticated user
    pub fn for_user(
        user_id: impl Into<String>,
        ip_address: Option<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        let mut identity = Self::new(ip_address, user_agent);
        identity.linked_user = Some(user_id.into());
        identity
    }

    pub fn is_merged(&self) -> bool {
        self.merged_into.is_some()
    }

    pub fn is_canonical(&self) -> bool {
        self.merged_into.is_none()
    }
}

/// Recorded marketing exposure
///
/// Immutable after insert except for the owning-identity foreign key,
/// which is rewritten in bulk during identity merges.
#[derive(Debug, Clone, PartialEq)]
pub struct Touchpoint {
    pub guid: Uuid,
    pub identity: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub referrer: String,
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
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl Touchpoint {
    /// Create a touchpoint for an identity with no tracking parameters set
    pub fn new(
        identity: Uuid,
        url: impl Into<String>,
        referrer: impl Into<String>,
        ip_address: Option<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            guid: Uuid::new_v4(),
            identity: Some(identity),
            created_at: crate::time::now(),
            url: url.into(),
            referrer: referrer.into(),
            utm_source: String::new(),
            utm_medium: String::new(),
            utm_campaign: String::new(),
            utm_term: String::new(),
            utm_content: String::new(),
            fbclid: String::new(),
            gclid: String::new(),
            msclkid: String::new(),
            ttclid: String::new(),
            li_fat_id: String::new(),
            twclid: String::new(),
            igshid: String::new(),
            ip_address,
            user_agent: user_agent.into(),
        }
    }

    /// Set a named tracking parameter; returns false for unrecognized names
    pub fn set_param(&mut self, name: &str, value: &str) -> bool {
        let field = match name {
            "utm_source" => &mut self.utm_source,
            "utm_medium" => &mut self.utm_medium,
            "utm_campaign" => &mut self.utm_campaign,
            "utm_term" => &mut self.utm_term,
            "utm_content" => &mut self.utm_content,
            "fbclid" => &mut self.fbclid,
            "gclid" => &mut self.gclid,
            "msclkid" => &mut self.msclkid,
            "ttclid" => &mut self.ttclid,
            "li_fat_id" => &mut self.li_fat_id,
            "twclid" => &mut self.twclid,
            "igshid" => &mut self.igshid,
            _ => return false,
        };
        *field = value.to_string();
        true
    }
}

/// Polymorphic reference to a business-domain object, stored as a
/// (type-tag, opaque-id) pair; resolution is the caller's concern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub kind: String,
    pub id: String,
}

impl SourceRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Recorded business event (append-only ledger)
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub guid: Uuid,
    pub identity: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub event: String,
    pub value: Option<Decimal>,
    pub currency: String,
    pub is_confirmed: bool,
    pub custom_data: Value,
    pub source_ref: Option<SourceRef>,
}

impl Conversion {
    pub fn new(identity: Option<Uuid>, event: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            identity,
            created_at: crate::time::now(),
            event: event.into(),
            value: None,
            currency: currency.into(),
            is_confirmed: true,
            custom_data: Value::Object(serde_json::Map::new()),
            source_ref: None,
        }
    }

    pub fn is_monetary(&self) -> bool {
        matches!(self.value, Some(v) if v > Decimal::ZERO)
    }
}
