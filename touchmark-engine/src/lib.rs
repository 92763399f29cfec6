//! # Touchmark Attribution Engine
//!
//! Resolves visitor identities across anonymous and authenticated sessions,
//! records marketing touchpoints and conversion events, and answers
//! attribution-window queries over them.
//!
//! - `request` / `tracker`: transport-agnostic request model and the
//!   two-phase identity-reference tracker (cookie implementation included)
//! - `params`: tracking-parameter extraction, normalization, bot/path exclusion
//! - `resolver`: the per-request identity resolution state machine
//! - `reconcile`: merge, canonicalization, and merge-cycle healing
//! - `attribution`: first-touch/last-touch window queries (single bulk SQL)
//! - `recorder`: validated, allow-list-scoped conversion recording

pub mod attribution;
pub mod params;
pub mod reconcile;
pub mod recorder;
pub mod request;
pub mod resolver;
pub mod tracker;

pub use attribution::{
    AttributedConversion, AttributedTouchpoint, AttributionMetadata, AttributionPolicy,
    AttributionQuery,
};
pub use recorder::{record_conversion, ConversionScope, RecordConversion, RecordOutcome};
pub use request::{PendingReference, RequestContext, ResponseContext};
pub use resolver::AttributionEngine;
pub use tracker::{CookieIdentityTracker, IdentityTracker};
