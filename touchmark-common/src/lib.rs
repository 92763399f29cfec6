//! # Touchmark Common Library
//!
//! Shared code for the touchmark attribution engine:
//! - Database models and per-table stores (identities, touchpoints, conversions)
//! - Configuration loading with compiled defaults
//! - Error types
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use config::{AttributionConfig, CookieConfig};
pub use error::{Error, Result};
