//! Tracking-parameter extraction and request exclusion
//!
//! A request carries a tracking signal when any recognized query parameter
//! survives normalization, or when the trigger header is present with the
//! configured value. Bot traffic and excluded path prefixes bypass tracking
//! entirely.

use crate::request::RequestContext;
use std::collections::BTreeMap;
use touchmark_common::AttributionConfig;
use tracing::warn;

/// Extract recognized tracking parameters from the request's query string.
///
/// Parameter names match exactly and case-sensitively. Values go through
/// trim, plus-to-space + percent-decoding, a length cap, non-printable
/// stripping, and whitespace collapsing; anything left empty is dropped.
pub fn extract_tracking_params(
    config: &AttributionConfig,
    req: &RequestContext,
) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for name in &config.tracking_parameters {
        let Some(raw) = req.query_param(name) else {
            continue;
        };
        if let Some(value) = normalize_param_value(raw, name, config.max_param_length) {
            params.insert(name.clone(), value);
        }
    }
    params
}

fn normalize_param_value(value: &str, name: &str, max_len: usize) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    // unquote-plus semantics: '+' means space, then percent-decode
    let plus_decoded = trimmed.replace('+', " ");
    let decoded = match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            warn!("Error decoding tracking parameter {}: {}", name, e);
            return None;
        }
    };

    if decoded.chars().count() > max_len {
        warn!("Tracking parameter {} exceeds maximum length", name);
        return None;
    }

    let cleaned: String = decoded
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();
    let normalized = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Whether this request carries a tracking trigger
pub fn has_trigger(
    config: &AttributionConfig,
    req: &RequestContext,
    params: &BTreeMap<String, String>,
) -> bool {
    if !params.is_empty() {
        return true;
    }
    req.header(&config.trigger_header) == Some(config.trigger_value.as_str())
}

/// Whether this request bypasses tracking entirely (excluded path or bot)
pub fn is_excluded(config: &AttributionConfig, req: &RequestContext) -> bool {
    if config
        .excluded_paths
        .iter()
        .any(|prefix| req.path.starts_with(prefix.as_str()))
    {
        return true;
    }

    if config.filter_bots {
        let user_agent = req.user_agent().to_lowercase();
        if config
            .bot_patterns
            .iter()
            .any(|pattern| user_agent.contains(&pattern.to_lowercase()))
        {
            return true;
        }
    }

    false
}
