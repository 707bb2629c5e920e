//! Operational events published by the session core.
//!
//! These flow over the broadcast event bus to whoever watches the gateway:
//! the binary logs them, alerting hooks can react to `RetryExhausted`, and
//! tests use them to observe timing-dependent behavior.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::session::SessionState;
use crate::tenant::{SenderId, TenantId};

/// Events emitted during session lifecycle and message delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session moved between lifecycle states.
    StateChanged {
        tenant_id: TenantId,
        from: SessionState,
        to: SessionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<SessionError>,
    },

    /// An aggregated batch reached the downstream handler.
    BatchDispatched {
        tenant_id: TenantId,
        sender_id: SenderId,
        message_count: usize,
        /// Number of dispatch calls it took (1 = first try).
        attempts: u32,
    },

    /// A batch was dropped after every dispatch attempt failed.
    RetryExhausted {
        tenant_id: TenantId,
        error: SessionError,
        message_count: usize,
    },

    /// The cleanup sweep stopped an idle session.
    SessionEvicted {
        tenant_id: TenantId,
        idle_secs: i64,
    },

    /// Persisted credentials for a tenant were deleted by a reset.
    AuthPurged { tenant_id: TenantId },
}

impl SessionEvent {
    /// The tenant this event concerns.
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            SessionEvent::StateChanged { tenant_id, .. }
            | SessionEvent::BatchDispatched { tenant_id, .. }
            | SessionEvent::RetryExhausted { tenant_id, .. }
            | SessionEvent::SessionEvicted { tenant_id, .. }
            | SessionEvent::AuthPurged { tenant_id } => tenant_id,
        }
    }

    /// Whether an operator should hear about this event.
    ///
    /// Dropped batches, evictions, purges and sessions that terminated with
    /// a failure are alerts. Routine transitions and deliveries are not.
    pub fn is_alert(&self) -> bool {
        match self {
            SessionEvent::StateChanged { to, reason, .. } => {
                *to == SessionState::Terminated && reason.is_some()
            }
            SessionEvent::BatchDispatched { .. } => false,
            SessionEvent::RetryExhausted { .. }
            | SessionEvent::SessionEvicted { .. }
            | SessionEvent::AuthPurged { .. } => true,
        }
    }
}
