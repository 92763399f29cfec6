//! Transport-agnostic request and response model
//!
//! The engine never touches a web framework directly. Hosts build a
//! `RequestContext` from their inbound request, run the resolver against it,
//! and apply any queued reference write to their outgoing response through
//! the tracker's `apply_pending`.

use std::collections::HashMap;
use uuid::Uuid;

/// A queued identity-reference mutation, applied to the response at most once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingReference {
    /// Write (or overwrite) the reference to this identity
    Write(Uuid),
    /// Delete the stored reference
    Clear,
}

/// Snapshot of one inbound request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub url: String,
    pub path: String,
    /// Raw (still percent-encoded) query pairs in request order
    pub query: Vec<(String, String)>,
    /// Header map with lowercase names
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub remote_addr: Option<String>,
    /// Authenticated user id, if the host has authenticated this request
    pub user_id: Option<String>,
    pending_reference: Option<PendingReference>,
}

impl RequestContext {
    /// Build a context from a full request URL, splitting path and raw query
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let after_scheme = match url.find("://") {
            Some(pos) => &url[pos + 3..],
            None => url.as_str(),
        };
        let path_and_query = match after_scheme.find('/') {
            Some(pos) => &after_scheme[pos..],
            None => "/",
        };
        let (path, raw_query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p.to_string(), q),
            None => (path_and_query.to_string(), ""),
        };

        let query = raw_query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();

        Self {
            url,
            path,
            query,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    pub fn referrer(&self) -> &str {
        self.header("referer").unwrap_or("")
    }

    /// Client IP: first x-forwarded-for entry, else the remote address
    pub fn client_ip(&self) -> Option<String> {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Some(first.to_string());
                }
            }
        }
        self.remote_addr.clone()
    }

    /// First raw query value for an exact, case-sensitive name
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Queue an identity-reference mutation; a later queue overwrites an
    /// earlier one (last writer wins within a request)
    pub fn queue_reference(&mut self, pending: PendingReference) {
        self.pending_reference = Some(pending);
    }

    /// Take the queued mutation, leaving none behind (apply-at-most-once)
    pub fn take_pending_reference(&mut self) -> Option<PendingReference> {
        self.pending_reference.take()
    }

    pub fn pending_reference(&self) -> Option<&PendingReference> {
        self.pending_reference.as_ref()
    }
}

/// Cookie mutations destined for the outgoing response
#[derive(Debug, Clone, Default)]
pub struct ResponseContext {
    /// Rendered Set-Cookie header values
    pub set_cookies: Vec<String>,
}

impl ResponseContext {
    pub fn new() -> Self {
        Self::default()
    }
}
