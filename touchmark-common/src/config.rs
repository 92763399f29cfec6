//! Configuration loading with compiled defaults
//!
//! Resolution order for the config file path:
//! 1. Explicit path argument (highest priority)
//! 2. `TOUCHMARK_CONFIG` environment variable
//! 3. Compiled defaults (no file)
//!
//! A missing file degrades to compiled defaults with a warning; a malformed
//! file is a hard configuration error.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Environment variable naming the config file path
pub const CONFIG_PATH_ENV_VAR: &str = "TOUCHMARK_CONFIG";

/// Attribution engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// Query parameter names recognized as tracking signals (exact, case-sensitive)
    pub tracking_parameters: Vec<String>,
    /// Maximum accepted length of a decoded tracking-parameter value
    pub max_param_length: usize,
    /// Whether bot traffic is excluded from tracking
    pub filter_bots: bool,
    /// Case-insensitive substrings matched against the user-agent header
    pub bot_patterns: Vec<String>,
    /// URL path prefixes that bypass tracking unconditionally
    pub excluded_paths: Vec<String>,
    /// Default currency code for recorded conversions
    pub default_currency: String,
    /// Default attribution lookback window in days
    pub default_window_days: i64,
    /// Per-traffic-source overrides of the lookback window, keyed by utm_source
    pub source_window_overrides: BTreeMap<String, i64>,
    /// Header that forces a tracking trigger even without tracking parameters
    pub trigger_header: String,
    /// Required value of the trigger header
    pub trigger_value: String,
    /// Identity reference cookie settings
    pub cookie: CookieConfig,
}

/// Identity reference cookie settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub name: String,
    /// Lifetime in seconds
    pub max_age: i64,
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: String,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            tracking_parameters: default_tracking_parameters(),
            max_param_length: 200,
            filter_bots: true,
            bot_patterns: default_bot_patterns(),
            excluded_paths: vec!["/admin/".to_string(), "/api/".to_string()],
            default_currency: "EUR".to_string(),
            default_window_days: 30,
            source_window_overrides: BTreeMap::new(),
            trigger_header: "x-attribution-trigger".to_string(),
            trigger_value: "true".to_string(),
            cookie: CookieConfig::default(),
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "_tm_id".to_string(),
            max_age: 60 * 60 * 24 * 90, // 90 days
            domain: None,
            path: "/".to_string(),
            secure: false,
            http_only: true,
            same_site: "Lax".to_string(),
        }
    }
}

fn default_tracking_parameters() -> Vec<String> {
    [
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_term",
        "utm_content",
        "fbclid",
        "gclid",
        "msclkid",
        "ttclid",
        "li_fat_id",
        "twclid",
        "igshid",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_bot_patterns() -> Vec<String> {
    [
        // Generic patterns
        "bot",
        "crawler",
        "spider",
        "scraper",
        "robot",
        // Social media crawlers
        "facebookexternalhit",
        "facebookcatalog",
        "facebookbot",
        "twitterbot",
        "linkedinbot",
        "slackbot",
        "whatsapp",
        "telegrambot",
        "skypeuripreview",
        // Search engines
        "googlebot",
        "bingbot",
        "yandexbot",
        "duckduckbot",
        "baiduspider",
        "sogou",
        // SEO/Analytics tools
        "ahrefsbot",
        "semrushbot",
        "mj12bot",
        "dotbot",
        "screamingfrogseospider",
        "siteauditbot",
        // Other common crawlers
        "applebot",
        "pinterestbot",
        "redditbot",
        "ia_archiver",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Load configuration from a TOML file, falling back to compiled defaults
pub fn load_config(path: Option<&Path>) -> Result<AttributionConfig> {
    let resolved = match path {
        Some(p) => Some(p.to_path_buf()),
        None => std::env::var(CONFIG_PATH_ENV_VAR)
            .ok()
            .map(std::path::PathBuf::from),
    };

    let Some(config_path) = resolved else {
        return Ok(AttributionConfig::default());
    };

    if !config_path.exists() {
        warn!(
            "Config file not found: {} - using compiled defaults",
            config_path.display()
        );
        return Ok(AttributionConfig::default());
    }

    let contents = std::fs::read_to_string(&config_path)?;
    toml::from_str(&contents).map_err(|e| {
        Error::Config(format!(
            "failed to parse {}: {}",
            config_path.display(),
            e
        ))
    })
}
