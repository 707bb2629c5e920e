use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tenant::{SenderId, TenantId};

/// Errors related to tenant sessions.
///
/// Transport failures (`HandshakeTimeout`, `HandshakeRejected`,
/// `TransportDropped`) are handled by the reconnection policy and only become
/// visible as the `last_failure` of a terminated session. `DispatchFailed` is
/// retried by the message buffer; `RetryExhausted` is what gets reported once
/// the retry budget is gone.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionError {
    #[error("handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("handshake rejected: {reason}")]
    HandshakeRejected { reason: String },

    #[error("transport dropped: {reason}")]
    TransportDropped { reason: String },

    #[error("dispatch failed: {reason}")]
    DispatchFailed { reason: String },

    #[error("dispatch for sender '{sender_id}' gave up after {attempts} attempts: {last_error}")]
    RetryExhausted {
        sender_id: SenderId,
        attempts: u32,
        /// Error of the final dispatch call, usually `DispatchFailed`.
        last_error: Box<SessionError>,
    },

    #[error("tenant '{tenant_id}' not found")]
    TenantNotFound { tenant_id: TenantId },

    #[error("tenant '{tenant_id}' already has a live session; start ignored")]
    ConcurrentStartIgnored { tenant_id: TenantId },

    #[error("tenant '{tenant_id}' is not connected")]
    NotConnected { tenant_id: TenantId },

    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("auth store error: {reason}")]
    AuthStore { reason: String },
}

impl SessionError {
    pub fn not_found(tenant_id: &TenantId) -> Self {
        SessionError::TenantNotFound {
            tenant_id: tenant_id.clone(),
        }
    }

    /// Whether the error is a transport-level failure the reconnection
    /// policy is allowed to recover from.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            SessionError::HandshakeTimeout { .. }
                | SessionError::HandshakeRejected { .. }
                | SessionError::TransportDropped { .. }
        )
    }
}

/// Errors from the persisted auth store.
#[derive(Debug, Error)]
pub enum AuthStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt auth data for tenant '{0}'")]
    Corrupt(TenantId),
}

impl From<AuthStoreError> for SessionError {
    fn from(e: AuthStoreError) -> Self {
        SessionError::AuthStore {
            reason: e.to_string(),
        }
    }
}
