//! Transport port: the chat-network connection owned by a live session.
//!
//! The wire protocol and pairing flow belong to the implementation. The core
//! only sees a handshake that either yields an event stream or fails, plus
//! `send` and `close`. Inbound messages and disconnect notifications arrive
//! on the handshake's event channel; a closed channel counts as a drop.

use botline_types::error::SessionError;
use botline_types::message::{InboundMessage, OutboundMessage};
use botline_types::session::AuthArtifact;
use botline_types::tenant::TenantId;
use tokio::sync::mpsc;

/// Something the connection reports after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A message arrived from a remote sender.
    Message(InboundMessage),
    /// The connection went away (network error, remote logout, ...).
    Disconnected { reason: String },
}

/// Result of a successful handshake.
#[derive(Debug)]
pub struct Handshake {
    /// Fresh credentials to persist. `None` keeps whatever was presented.
    pub artifact: Option<AuthArtifact>,
    /// Inbound events for the lifetime of this connection.
    pub events: mpsc::Receiver<TransportEvent>,
}

/// A single tenant's connection to the chat network.
///
/// One instance per live session; the session's lifecycle task owns it.
pub trait Transport: Send + Sync + 'static {
    /// Run the authentication handshake.
    ///
    /// `artifact` carries previously persisted credentials, if any. Rejections
    /// should be reported as `SessionError::HandshakeRejected`. The caller
    /// bounds the call with the configured handshake timeout.
    fn connect(
        &self,
        artifact: Option<AuthArtifact>,
    ) -> impl std::future::Future<Output = Result<Handshake, SessionError>> + Send;

    /// Deliver an outbound message over the established connection.
    fn send(
        &self,
        message: &OutboundMessage,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;

    /// Tear the connection down. Must be safe to call more than once.
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// Creates one `Transport` per session.
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: Transport;

    fn create(&self, tenant_id: &TenantId) -> Self::Transport;
}
