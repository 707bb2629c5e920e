//! JSON envelope shared by every admin API response.
//!
//! Success and failure use the same shape so clients parse one format:
//! `data` carries the payload, `errors` the failures, `meta` identifies the
//! request, and `_links` points at the follow-up tenant operations.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::Json;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use botline_types::tenant::TenantId;

/// Prefix for every tenant route.
pub const TENANTS_PATH: &str = "/api/v1/tenants";

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub meta: Meta,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorEntry>,
    #[serde(rename = "_links", skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorEntry {
    /// Machine-readable code, e.g. `TENANT_NOT_FOUND`.
    pub code: &'static str,
    pub message: String,
}

/// Started when a handler begins; stamps the envelope it finally returns.
#[derive(Debug)]
pub struct RequestClock {
    request_id: Uuid,
    started: Instant,
}

impl RequestClock {
    pub fn start() -> Self {
        Self {
            request_id: Uuid::now_v7(),
            started: Instant::now(),
        }
    }

    fn meta(&self) -> Meta {
        Meta {
            request_id: self.request_id,
            timestamp: Utc::now(),
            response_time_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    pub fn ok<T: Serialize>(&self, data: T) -> Envelope<T> {
        Envelope {
            data: Some(data),
            meta: self.meta(),
            errors: Vec::new(),
            links: BTreeMap::new(),
        }
    }
}

impl Envelope<()> {
    /// Error envelope outside any handler clock.
    pub fn failure(code: &'static str, message: String) -> Self {
        Envelope {
            data: None,
            meta: RequestClock::start().meta(),
            errors: vec![ErrorEntry { code, message }],
            links: BTreeMap::new(),
        }
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn link(mut self, rel: &'static str, href: impl Into<String>) -> Self {
        self.links.insert(rel, href.into());
        self
    }

    /// Links to the tenant resource and the admin actions on it.
    pub fn tenant_links(self, tenant_id: &TenantId) -> Self {
        let base = format!("{TENANTS_PATH}/{tenant_id}");
        self.link("start", format!("{base}/start"))
            .link("stop", format!("{base}/stop"))
            .link("reset", format!("{base}/reset"))
            .link("messages", format!("{base}/messages"))
            .link("self", base)
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
