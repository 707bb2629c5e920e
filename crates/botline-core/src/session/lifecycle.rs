//! The background task that drives one session through its states.
//!
//! Loop per connection attempt:
//! 1. handshake (bounded by the configured timeout, presenting any known
//!    credentials)
//! 2. on success, persist fresh credentials and pump transport events into
//!    the buffer while serving outbound sends
//! 3. on failure or drop, ask the reconnection controller whether to wait
//!    and retry or to terminate
//!
//! Administrative termination (stop/reset) makes every further transition
//! fail, which ends the loop; the session's cancellation token interrupts
//! whatever the loop is currently waiting on.

use std::sync::Arc;

use botline_types::error::SessionError;
use botline_types::session::{AuthArtifact, SessionState};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::reconnect::{ReconnectController, ReconnectDecision};
use crate::repository::AuthStore;
use crate::session::handle::{OutboundCommand, Session};
use crate::transport::{Handshake, Transport, TransportEvent};

enum Attempt {
    Connected(Handshake),
    Failed(SessionError),
    Cancelled,
}

enum PumpExit {
    Dropped(SessionError),
    Cancelled,
}

pub(crate) struct Lifecycle<T: Transport, A: AuthStore> {
    session: Arc<Session>,
    transport: T,
    auth_store: Arc<A>,
    controller: ReconnectController,
    outbound: mpsc::Receiver<OutboundCommand>,
}

impl<T: Transport, A: AuthStore> Lifecycle<T, A> {
    pub(crate) fn new(
        session: Arc<Session>,
        transport: T,
        auth_store: Arc<A>,
        controller: ReconnectController,
        outbound: mpsc::Receiver<OutboundCommand>,
    ) -> Self {
        Self {
            session,
            transport,
            auth_store,
            controller,
            outbound,
        }
    }

    /// Run until the session terminates. Expects the session to already be
    /// in `Authenticating`.
    pub(crate) async fn run(mut self) {
        let cancel = self.session.cancel_token().clone();
        let mut reconnecting = false;

        loop {
            if reconnecting && !self.session.transition(SessionState::Authenticating, None) {
                break;
            }

            let failure = match self.handshake(&cancel).await {
                Attempt::Cancelled => break,
                Attempt::Failed(error) => {
                    if self.controller.counts_failures() {
                        let attempts = self.session.increment_attempts();
                        debug!(
                            tenant_id = %self.session.tenant_id(),
                            attempts,
                            "authentication attempt failed"
                        );
                    }
                    error
                }
                Attempt::Connected(handshake) => {
                    if !self.establish(handshake.artifact).await {
                        break;
                    }
                    match self.pump(handshake.events, &cancel).await {
                        PumpExit::Cancelled => break,
                        PumpExit::Dropped(error) => error,
                    }
                }
            };

            warn!(
                tenant_id = %self.session.tenant_id(),
                error = %failure,
                "session connection failed"
            );
            if !self
                .session
                .transition(SessionState::Disconnected, Some(failure.clone()))
            {
                break;
            }
            self.reject_queued();

            match self
                .controller
                .decide_after(&failure, self.session.reconnect_attempts())
            {
                ReconnectDecision::GiveUp => {
                    warn!(
                        tenant_id = %self.session.tenant_id(),
                        attempts = self.session.reconnect_attempts(),
                        "giving up on session"
                    );
                    self.session
                        .transition(SessionState::Terminated, Some(failure));
                    break;
                }
                ReconnectDecision::Retry { delay, attempt } => {
                    if !self.session.transition(SessionState::ReconnectPending, None) {
                        break;
                    }
                    info!(
                        tenant_id = %self.session.tenant_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "reconnect scheduled"
                    );
                    if !self.controller.wait(delay, &cancel).await {
                        break;
                    }
                    reconnecting = true;
                }
            }
        }

        self.transport.close().await;
        self.outbound.close();
        self.reject_queued();
        debug!(tenant_id = %self.session.tenant_id(), "lifecycle task finished");
    }

    async fn handshake(&self, cancel: &CancellationToken) -> Attempt {
        let artifact = self.load_artifact().await;
        let timeout = self.controller.handshake_timeout();
        debug!(
            tenant_id = %self.session.tenant_id(),
            has_artifact = artifact.is_some(),
            "starting handshake"
        );

        tokio::select! {
            _ = cancel.cancelled() => Attempt::Cancelled,
            result = tokio::time::timeout(timeout, self.transport.connect(artifact)) => match result {
                Ok(Ok(handshake)) => Attempt::Connected(handshake),
                Ok(Err(error)) => Attempt::Failed(error),
                Err(_) => Attempt::Failed(SessionError::HandshakeTimeout {
                    timeout_ms: self.controller.policy().timeout_ms,
                }),
            },
        }
    }

    /// Credentials to present: the session's own copy, else the store's.
    async fn load_artifact(&self) -> Option<AuthArtifact> {
        if let Some(artifact) = self.session.auth_artifact() {
            return Some(artifact);
        }
        match self.auth_store.load(self.session.tenant_id()).await {
            Ok(Some(artifact)) => {
                self.session.set_auth_artifact(artifact.clone());
                Some(artifact)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    tenant_id = %self.session.tenant_id(),
                    error = %e,
                    "failed to load persisted credentials, pairing from scratch"
                );
                None
            }
        }
    }

    /// Persist fresh credentials and enter `Connected`.
    async fn establish(&self, artifact: Option<AuthArtifact>) -> bool {
        if let Some(artifact) = artifact {
            if let Err(e) = self.auth_store.save(self.session.tenant_id(), &artifact).await {
                warn!(
                    tenant_id = %self.session.tenant_id(),
                    error = %e,
                    "failed to persist credentials"
                );
            }
            self.session.set_auth_artifact(artifact);
        }
        if !self.session.transition(SessionState::Connected, None) {
            return false;
        }
        self.session.touch();
        true
    }

    async fn pump(
        &mut self,
        mut events: mpsc::Receiver<TransportEvent>,
        cancel: &CancellationToken,
    ) -> PumpExit {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return PumpExit::Cancelled,
                event = events.recv() => match event {
                    Some(TransportEvent::Message(message)) => {
                        self.session.touch();
                        self.session.buffer().push(message);
                    }
                    Some(TransportEvent::Disconnected { reason }) => {
                        return PumpExit::Dropped(SessionError::TransportDropped { reason });
                    }
                    None => {
                        return PumpExit::Dropped(SessionError::TransportDropped {
                            reason: "event stream closed".to_string(),
                        });
                    }
                },
                Some(command) = self.outbound.recv() => {
                    let result = self.transport.send(&command.message).await;
                    if result.is_ok() {
                        self.session.touch();
                    }
                    let _ = command.reply.send(result);
                }
            }
        }
    }

    fn reject_queued(&mut self) {
        while let Ok(command) = self.outbound.try_recv() {
            let _ = command.reply.send(Err(SessionError::NotConnected {
                tenant_id: self.session.tenant_id().clone(),
            }));
        }
    }
}
