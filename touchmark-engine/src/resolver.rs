//! Per-request identity resolution
//!
//! Produces exactly one canonical identity for a request, or none, while
//! maintaining the global invariants: one canonical identity per user, no
//! self-merges, merge chains that terminate. Resolution never raises out of
//! `process_request`; on unexpected internal errors the request proceeds
//! without attribution.

use crate::params;
use crate::reconcile;
use crate::request::RequestContext;
use crate::tracker::{CookieIdentityTracker, IdentityTracker};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use touchmark_common::db::{self, Identity, Touchpoint};
use touchmark_common::{AttributionConfig, Result};
use tracing::{debug, error, info, warn};

/// The per-request attribution front door: resolves identities and records
/// touchpoints against them
pub struct AttributionEngine {
    pool: SqlitePool,
    config: AttributionConfig,
    tracker: Arc<dyn IdentityTracker>,
}

impl AttributionEngine {
    /// Engine with the default cookie-backed tracker
    pub fn new(pool: SqlitePool, config: AttributionConfig) -> Self {
        let tracker = Arc::new(CookieIdentityTracker::new(config.cookie.clone()));
        Self::with_tracker(pool, config, tracker)
    }

    pub fn with_tracker(
        pool: SqlitePool,
        config: AttributionConfig,
        tracker: Arc<dyn IdentityTracker>,
    ) -> Self {
        Self {
            pool,
            config,
            tracker,
        }
    }

    pub fn config(&self) -> &AttributionConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The tracker, for applying queued reference writes to the response
    pub fn tracker(&self) -> &Arc<dyn IdentityTracker> {
        &self.tracker
    }

    /// Resolve the identity for one inbound request and record a touchpoint
    /// when the request carries a tracking trigger.
    ///
    /// Never fails: excluded traffic and internal errors both degrade to
    /// `None`, and the surrounding request proceeds unattributed.
    pub async fn process_request(&self, req: &mut RequestContext) -> Option<Identity> {
        if params::is_excluded(&self.config, req) {
            return None;
        }

        let tracking = params::extract_tracking_params(&self.config, req);
        let trigger = params::has_trigger(&self.config, req, &tracking);

        let resolved = match self.resolve(req, trigger).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(error = %e, "Identity resolution failed - proceeding without attribution");
                return None;
            }
        };

        if let Some(identity) = &resolved {
            if trigger {
                if let Err(e) = self.record_touchpoint(identity, req, &tracking).await {
                    error!(error = %e, identity = %identity.guid, "Failed to record touchpoint");
                }
            }
        }

        resolved
    }

    /// Login-time hook: the visitor just authenticated as `user_id` with
    /// `current` as the identity resolved earlier in the request, if any.
    /// Returns the identity the request should use from here on.
    pub async fn on_user_login(
        &self,
        req: &mut RequestContext,
        current: Option<Identity>,
        user_id: &str,
    ) -> Option<Identity> {
        match self.resolve_for_user(req, current, user_id).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                error!(error = %e, user = user_id, "Login-time identity reconciliation failed");
                None
            }
        }
    }

    async fn resolve(&self, req: &mut RequestContext, trigger: bool) -> Result<Option<Identity>> {
        match req.user_id.clone() {
            Some(user_id) => {
                let current = self.current_identity(req).await?;
                Ok(Some(self.resolve_for_user(req, current, &user_id).await?))
            }
            None => self.resolve_anonymous(req, trigger).await,
        }
    }

    /// Anonymous visitors: honor an existing reference with or without a
    /// trigger; create a new identity only on a trigger.
    async fn resolve_anonymous(
        &self,
        req: &mut RequestContext,
        trigger: bool,
    ) -> Result<Option<Identity>> {
        if let Some(current) = self.current_identity(req).await? {
            let canonical = reconcile::canonicalize(&self.pool, current.clone()).await?;
            if canonical.guid != current.guid {
                // Stored reference points at a tombstone; repoint it
                self.tracker.queue_write(req, &canonical);
            }
            // A linked identity is still returned as-is for anonymous
            // requests; its presence does not imply the visitor is that user
            return Ok(Some(canonical));
        }

        if !trigger {
            return Ok(None);
        }

        let identity = Identity::new(req.client_ip(), req.user_agent());
        db::identities::insert_identity(&self.pool, &identity).await?;
        self.tracker.queue_write(req, &identity);
        info!(identity = %identity.guid, "Created new anonymous identity");
        Ok(Some(identity))
    }

    /// Authenticated visitors: claim, link, or resolve the shared-device
    /// conflict, then refresh the reference to whatever came out canonical.
    async fn resolve_for_user(
        &self,
        req: &mut RequestContext,
        current: Option<Identity>,
        user_id: &str,
    ) -> Result<Identity> {
        let Some(current) = current else {
            return self.user_canonical_or_new(req, user_id).await;
        };

        let current = reconcile::canonicalize(&self.pool, current).await?;

        match current.linked_user.as_deref() {
            Some(linked) if linked == user_id => {
                self.tracker.queue_write(req, &current);
                Ok(current)
            }
            Some(_) => {
                // Shared device: never touch the other user's identity or
                // history; resolve through this user's own identity instead
                warn!(
                    identity = %current.guid,
                    user = user_id,
                    "Identity linked to a different user - resolving via user's own identity"
                );
                self.user_canonical_or_new(req, user_id).await
            }
            None => {
                let unmerged = reconcile::find_unmerged_user_identities(&self.pool, user_id).await?;
                if unmerged.is_empty() {
                    let linked = reconcile::link_identity_to_user(&self.pool, &current, user_id).await?;
                    self.tracker.queue_write(req, &linked);
                    Ok(linked)
                } else {
                    let canonical = reconcile::establish_canonical(&self.pool, unmerged, &current).await?;
                    info!(
                        merged = %current.guid,
                        canonical = %canonical.guid,
                        user = user_id,
                        "Merged session identity into user's canonical identity"
                    );
                    self.tracker.queue_write(req, &canonical);
                    Ok(canonical)
                }
            }
        }
    }

    /// The user's existing canonical identity, or a fresh one linked to them.
    /// Overwrites whatever reference the request carried.
    async fn user_canonical_or_new(
        &self,
        req: &mut RequestContext,
        user_id: &str,
    ) -> Result<Identity> {
        let unmerged = reconcile::find_unmerged_user_identities(&self.pool, user_id).await?;
        if !unmerged.is_empty() {
            let canonical = reconcile::collapse_duplicates(&self.pool, unmerged).await?;
            self.tracker.queue_write(req, &canonical);
            return Ok(canonical);
        }

        let identity = Identity::for_user(user_id, req.client_ip(), req.user_agent());
        db::identities::insert_identity(&self.pool, &identity).await?;
        self.tracker.queue_write(req, &identity);
        info!(identity = %identity.guid, user = user_id, "Created new identity for user");
        Ok(identity)
    }

    /// Look up the identity the request's reference points at.
    /// A reference to a non-existent identity (stale or tampered cookie)
    /// reads as no reference at all.
    async fn current_identity(&self, req: &RequestContext) -> Result<Option<Identity>> {
        let Some(reference) = self.tracker.read(req) else {
            return Ok(None);
        };

        match db::identities::get_identity(&self.pool, reference).await? {
            Some(identity) => Ok(Some(identity)),
            None => {
                debug!(reference = %reference, "Reference points at unknown identity - treating as untracked");
                Ok(None)
            }
        }
    }

    async fn record_touchpoint(
        &self,
        identity: &Identity,
        req: &RequestContext,
        tracking: &BTreeMap<String, String>,
    ) -> Result<Touchpoint> {
        let mut touchpoint = Touchpoint::new(
            identity.guid,
            req.url.clone(),
            req.referrer(),
            req.client_ip(),
            req.user_agent(),
        );
        for (name, value) in tracking {
            if !touchpoint.set_param(name, value) {
                debug!(param = %name, "Configured tracking parameter has no touchpoint field");
            }
        }

        db::touchpoints::insert_touchpoint(&self.pool, &touchpoint).await?;
        info!(
            identity = %identity.guid,
            source = %touchpoint.utm_source,
            "Recorded touchpoint"
        );
        Ok(touchpoint)
    }
}
