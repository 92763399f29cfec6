//! Database access for touchmark
//!
//! One module per table, free async functions over a `SqlitePool`. Bulk
//! ownership-reassignment helpers take a bare `SqliteConnection` so callers
//! can compose them inside one transaction.

pub mod conversions;
pub mod identities;
pub mod init;
pub mod models;
pub mod touchpoints;

pub use init::{create_schema, init_database};
pub use models::{Conversion, Identity, SourceRef, Touchpoint};

use crate::{Error, Result};
use uuid::Uuid;

pub(crate) fn parse_guid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::InvalidValue(format!("malformed guid '{}': {}", s, e)))
}
