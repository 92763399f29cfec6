//! Identity reference tracking
//!
//! The resolver depends on an abstract two-phase capability: read the
//! client-supplied reference, queue a write against the request, and apply
//! the queued write to the response at most once. The cookie implementation
//! is included; hosts may substitute session- or token-backed trackers.

use crate::request::{PendingReference, RequestContext, ResponseContext};
use touchmark_common::db::Identity;
use touchmark_common::CookieConfig;
use tracing::debug;
use uuid::Uuid;

/// Capability contract for reading and (deferred) writing the client-side
/// identity reference
pub trait IdentityTracker: Send + Sync {
    /// Read the reference carried by the request, if any
    fn read(&self, req: &RequestContext) -> Option<Uuid>;

    /// Queue a reference write to this identity; applied later, once a
    /// response exists
    fn queue_write(&self, req: &mut RequestContext, identity: &Identity);

    /// Queue deletion of the stored reference
    fn queue_clear(&self, req: &mut RequestContext);

    /// Apply the queued mutation to the response. At most once: a second
    /// call is a no-op, and a dropped response simply drops the queue.
    fn apply_pending(&self, req: &mut RequestContext, resp: &mut ResponseContext);
}

/// Cookie-backed identity tracker
pub struct CookieIdentityTracker {
    cookie: CookieConfig,
}

impl CookieIdentityTracker {
    pub fn new(cookie: CookieConfig) -> Self {
        Self { cookie }
    }

    fn render_cookie(&self, value: &str, max_age: i64) -> String {
        let mut rendered = format!(
            "{}={}; Max-Age={}; Path={}",
            self.cookie.name, value, max_age, self.cookie.path
        );
        if let Some(domain) = &self.cookie.domain {
            rendered.push_str("; Domain=");
            rendered.push_str(domain);
        }
        if !self.cookie.same_site.is_empty() {
            rendered.push_str("; SameSite=");
            rendered.push_str(&self.cookie.same_site);
        }
        if self.cookie.secure {
            rendered.push_str("; Secure");
        }
        if self.cookie.http_only {
            rendered.push_str("; HttpOnly");
        }
        rendered
    }
}

impl IdentityTracker for CookieIdentityTracker {
    fn read(&self, req: &RequestContext) -> Option<Uuid> {
        let raw = req.cookies.get(&self.cookie.name)?;
        match Uuid::parse_str(raw) {
            Ok(reference) => Some(reference),
            Err(_) => {
                debug!("Malformed identity reference cookie; ignoring");
                None
            }
        }
    }

    fn queue_write(&self, req: &mut RequestContext, identity: &Identity) {
        req.queue_reference(PendingReference::Write(identity.guid));
    }

    fn queue_clear(&self, req: &mut RequestContext) {
        req.queue_reference(PendingReference::Clear);
    }

    fn apply_pending(&self, req: &mut RequestContext, resp: &mut ResponseContext) {
        match req.take_pending_reference() {
            Some(PendingReference::Write(guid)) => {
                resp.set_cookies
                    .push(self.render_cookie(&guid.to_string(), self.cookie.max_age));
            }
            Some(PendingReference::Clear) => {
                resp.set_cookies.push(self.render_cookie("", 0));
            }
            None => {}
        }
    }
}
