//! Tenant session handlers for the REST API.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use botline_types::message::{InboundMessage, OutboundMessage};
use botline_types::session::SessionSnapshot;
use botline_types::tenant::{SenderId, TenantId};

use crate::http::error::AppError;
use crate::http::response::{Envelope, RequestClock, TENANTS_PATH};
use crate::state::AppState;

/// Result of a start request.
#[derive(Debug, Serialize)]
pub struct StartResponse {
    /// False when the tenant already had a live session.
    pub started: bool,
    pub session: SessionSnapshot,
}

/// Body of `POST /tenants/{id}/inbound`.
#[derive(Debug, Deserialize)]
pub struct InboundRequest {
    pub sender_id: SenderId,
    pub payload: String,
}

fn parse_tenant(raw: &str) -> Result<TenantId, AppError> {
    TenantId::from_str(raw).map_err(AppError::Validation)
}

/// GET /api/v1/tenants - Snapshot every known session.
pub async fn list_tenants(
    State(state): State<AppState>,
) -> Result<Envelope<Vec<SessionSnapshot>>, AppError> {
    let clock = RequestClock::start();

    let sessions = state.manager.list();
    Ok(clock.ok(sessions).link("self", TENANTS_PATH))
}

/// GET /api/v1/tenants/{id} - Session status for one tenant.
pub async fn get_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<SessionSnapshot>, AppError> {
    let clock = RequestClock::start();
    let tenant_id = parse_tenant(&id)?;

    let snapshot = state.manager.status(&tenant_id)?;
    Ok(clock.ok(snapshot).tenant_links(&tenant_id))
}

/// POST /api/v1/tenants/{id}/start - Start (or keep) the tenant's session.
pub async fn start_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<StartResponse>, AppError> {
    let clock = RequestClock::start();
    let tenant_id = parse_tenant(&id)?;

    let outcome = state.manager.start(&tenant_id).await;
    let body = StartResponse {
        started: outcome.was_started(),
        session: outcome.session().snapshot(),
    };
    Ok(clock.ok(body).tenant_links(&tenant_id))
}

/// POST /api/v1/tenants/{id}/stop - Graceful stop, credentials kept.
pub async fn stop_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<SessionSnapshot>, AppError> {
    let clock = RequestClock::start();
    let tenant_id = parse_tenant(&id)?;

    let snapshot = state.manager.stop(&tenant_id).await?;
    Ok(clock.ok(snapshot).tenant_links(&tenant_id))
}

/// POST /api/v1/tenants/{id}/reset - Tear down and purge credentials.
pub async fn reset_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<SessionSnapshot>, AppError> {
    let clock = RequestClock::start();
    let tenant_id = parse_tenant(&id)?;

    let snapshot = state.manager.reset(&tenant_id).await?;
    Ok(clock.ok(snapshot).tenant_links(&tenant_id))
}

/// POST /api/v1/tenants/{id}/messages - Send an outbound message.
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<OutboundMessage>,
) -> Result<Envelope<serde_json::Value>, AppError> {
    let clock = RequestClock::start();
    let tenant_id = parse_tenant(&id)?;

    if body.recipient.as_str().trim().is_empty() {
        return Err(AppError::Validation("recipient must not be empty".to_string()));
    }

    state.manager.send(&tenant_id, body).await?;
    Ok(clock.ok(serde_json::json!({ "sent": true })))
}

/// POST /api/v1/tenants/{id}/inbound - Inject an inbound message through the
/// loopback network, as if the sender had written it.
pub async fn inject_inbound(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<InboundRequest>,
) -> Result<Envelope<serde_json::Value>, AppError> {
    let clock = RequestClock::start();
    let tenant_id = parse_tenant(&id)?;

    if body.sender_id.as_str().trim().is_empty() {
        return Err(AppError::Validation("sender_id must not be empty".to_string()));
    }

    // Unknown tenants are a 404 rather than a link error.
    state.manager.get(&tenant_id)?;
    state
        .hub
        .inject(&tenant_id, InboundMessage::new(body.sender_id, body.payload))
        .await?;

    Ok(clock.ok(serde_json::json!({ "accepted": true })))
}
