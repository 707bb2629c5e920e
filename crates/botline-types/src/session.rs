//! Session state machine types and snapshots.
//!
//! A session is the live (or terminated) connection state of one tenant.
//! The state machine:
//!
//! ```text
//! Idle -> Authenticating -> Connected -> Disconnected -> ReconnectPending
//!              ^                              |                |
//!              +------------------------------+----------------+
//! any state -> Terminated (absorbing)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;
use crate::tenant::TenantId;

/// Lifecycle state of a tenant session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Authenticating,
    Connected,
    Disconnected,
    ReconnectPending,
    Terminated,
}

impl SessionState {
    /// Whether the state is `Terminated` (absorbing).
    pub fn is_terminated(self) -> bool {
        self == SessionState::Terminated
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Terminated never leaves; any other state may be terminated.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Idle, Authenticating) => true,
            (Authenticating, Connected) => true,
            (Authenticating, Disconnected) => true,
            (Connected, Disconnected) => true,
            (Disconnected, ReconnectPending) => true,
            (ReconnectPending, Authenticating) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Authenticating => write!(f, "authenticating"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::ReconnectPending => write!(f, "reconnect_pending"),
            SessionState::Terminated => write!(f, "terminated"),
        }
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SessionState::Idle),
            "authenticating" => Ok(SessionState::Authenticating),
            "connected" => Ok(SessionState::Connected),
            "disconnected" => Ok(SessionState::Disconnected),
            "reconnect_pending" => Ok(SessionState::ReconnectPending),
            "terminated" => Ok(SessionState::Terminated),
            other => Err(format!("invalid session state: '{other}'")),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

/// Opaque credential material produced by a handshake.
///
/// Owned by exactly one session while it is live; persisted through the
/// auth store between process restarts. The bytes never show up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthArtifact(Vec<u8>);

impl AuthArtifact {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AuthArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthArtifact(<{} bytes>)", self.0.len())
    }
}

/// Point-in-time view of a session, returned by the administrative surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub tenant_id: TenantId,
    /// Identifies this incarnation; a restart after termination gets a new one.
    pub session_id: Uuid,
    pub state: SessionState,
    pub reconnect_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Whether the session currently holds credential material.
    pub has_auth_artifact: bool,
    /// Messages currently waiting in aggregation windows.
    pub buffered_messages: usize,
    /// Reason attached when the session failed or terminated abnormally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<SessionError>,
}

impl SessionSnapshot {
    /// Seconds since the last recorded activity, relative to `now`.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity_at
    }
}
