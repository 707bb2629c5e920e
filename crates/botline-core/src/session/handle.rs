//! Shared handle to one tenant session.
//!
//! `Session` is the record the manager keeps per tenant. The state machine is
//! enforced here: every transition goes through [`Session::transition`],
//! which rejects illegal moves, logs, publishes a `StateChanged` event and
//! updates the watch channel, all under the record lock so observers see
//! transitions in order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use botline_types::config::BufferPolicy;
use botline_types::error::SessionError;
use botline_types::event::SessionEvent;
use botline_types::message::OutboundMessage;
use botline_types::session::{AuthArtifact, SessionSnapshot, SessionState};
use botline_types::tenant::TenantId;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::MessageBuffer;
use crate::dispatch::BoxDispatcher;
use crate::event::EventBus;

/// Outbound messages queued per session before `send` reports back-pressure.
const OUTBOUND_QUEUE: usize = 64;

/// How long `stop`/`reset` wait for the lifecycle task before aborting it.
const LIFECYCLE_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A message handed to the lifecycle task for delivery over the transport.
#[derive(Debug)]
pub(crate) struct OutboundCommand {
    pub message: OutboundMessage,
    pub reply: oneshot::Sender<Result<(), SessionError>>,
}

#[derive(Debug)]
struct SessionRecord {
    state: SessionState,
    reconnect_attempts: u32,
    last_activity_at: DateTime<Utc>,
    auth_artifact: Option<AuthArtifact>,
    last_failure: Option<SessionError>,
}

/// One tenant's session.
pub struct Session {
    tenant_id: TenantId,
    session_id: Uuid,
    created_at: DateTime<Utc>,
    record: Mutex<SessionRecord>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
    buffer: MessageBuffer,
    outbound: mpsc::Sender<OutboundCommand>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    events: EventBus,
}

impl Session {
    /// Create an `Idle` session and the receiving end of its outbound queue.
    pub(crate) fn new(
        tenant_id: TenantId,
        buffer_policy: BufferPolicy,
        dispatcher: Arc<BoxDispatcher>,
        events: EventBus,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundCommand>) {
        let now = Utc::now();
        let cancel = CancellationToken::new();
        let buffer = MessageBuffer::new(
            tenant_id.clone(),
            buffer_policy,
            dispatcher,
            events.clone(),
            cancel.child_token(),
        );
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

        let session = Arc::new(Self {
            tenant_id,
            session_id: Uuid::now_v7(),
            created_at: now,
            record: Mutex::new(SessionRecord {
                state: SessionState::Idle,
                reconnect_attempts: 0,
                last_activity_at: now,
                auth_artifact: None,
                last_failure: None,
            }),
            state_tx,
            cancel,
            buffer,
            outbound,
            task: tokio::sync::Mutex::new(None),
            events,
        });
        (session, outbound_rx)
    }

    fn record(&self) -> MutexGuard<'_, SessionRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.record().state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.record().reconnect_attempts
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.record().last_activity_at
    }

    pub fn is_live(&self) -> bool {
        !self.state().is_terminated()
    }

    pub(crate) fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Move to `to` if the state machine allows it.
    ///
    /// `reason` is recorded as the session's last failure. Entering
    /// `Connected` resets the reconnection counter and clears the failure.
    pub(crate) fn transition(&self, to: SessionState, reason: Option<SessionError>) -> bool {
        let mut record = self.record();
        let from = record.state;
        if !from.can_transition_to(to) {
            debug!(
                tenant_id = %self.tenant_id,
                from = %from,
                to = %to,
                "ignoring illegal session transition"
            );
            return false;
        }

        record.state = to;
        if to == SessionState::Connected {
            record.reconnect_attempts = 0;
            record.last_failure = None;
        }
        if let Some(reason) = &reason {
            record.last_failure = Some(reason.clone());
        }

        match &reason {
            Some(reason) => info!(
                tenant_id = %self.tenant_id,
                from = %from,
                to = %to,
                reason = %reason,
                "session state changed"
            ),
            None => info!(
                tenant_id = %self.tenant_id,
                from = %from,
                to = %to,
                "session state changed"
            ),
        }

        self.state_tx.send_replace(to);
        self.events.publish(SessionEvent::StateChanged {
            tenant_id: self.tenant_id.clone(),
            from,
            to,
            reason,
        });
        true
    }

    /// Record activity (inbound message, successful send, connect).
    pub(crate) fn touch(&self) {
        self.record().last_activity_at = Utc::now();
    }

    /// Count one failed reconnection attempt; returns the new total.
    pub(crate) fn increment_attempts(&self) -> u32 {
        let mut record = self.record();
        record.reconnect_attempts += 1;
        record.reconnect_attempts
    }

    pub(crate) fn auth_artifact(&self) -> Option<AuthArtifact> {
        self.record().auth_artifact.clone()
    }

    pub(crate) fn set_auth_artifact(&self, artifact: AuthArtifact) {
        self.record().auth_artifact = Some(artifact);
    }

    pub(crate) async fn attach(&self, handle: JoinHandle<()>) {
        *self.task.lock().await = Some(handle);
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, at: DateTime<Utc>) {
        self.record().last_activity_at = at;
    }

    /// Point-in-time view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        let buffered_messages = self.buffer.pending_count();
        let record = self.record();
        SessionSnapshot {
            tenant_id: self.tenant_id.clone(),
            session_id: self.session_id,
            state: record.state,
            reconnect_attempts: record.reconnect_attempts,
            created_at: self.created_at,
            last_activity_at: record.last_activity_at,
            has_auth_artifact: record.auth_artifact.is_some(),
            buffered_messages,
            last_failure: record.last_failure.clone(),
        }
    }

    /// Watch state changes as they happen.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Wait until the session reaches `target`.
    ///
    /// Returns `false` on timeout, or as soon as the session terminates when
    /// `target` is some other state.
    pub async fn wait_for_state(&self, target: SessionState, timeout: Duration) -> bool {
        let mut rx = self.state_tx.subscribe();
        let reached = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| *state == target || state.is_terminated()),
        )
        .await;
        matches!(reached, Ok(Ok(state)) if *state == target)
    }

    /// Send a message to a recipient through this session's connection.
    ///
    /// Fails with `NotConnected` unless the session is `Connected`.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), SessionError> {
        let not_connected = || SessionError::NotConnected {
            tenant_id: self.tenant_id.clone(),
        };

        let (reply, response) = oneshot::channel();
        {
            let record = self.record();
            if record.state != SessionState::Connected {
                return Err(not_connected());
            }
            self.outbound
                .try_send(OutboundCommand { message, reply })
                .map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => SessionError::Transport {
                        reason: "outbound queue is full".to_string(),
                    },
                    mpsc::error::TrySendError::Closed(_) => not_connected(),
                })?;
        }

        response.await.unwrap_or_else(|_| Err(not_connected()))
    }

    /// Gracefully stop: flush buffered messages, then close the transport.
    ///
    /// Persisted credentials are kept, so a later start can resume without
    /// pairing again. Stopping a terminated session only finishes cleanup.
    pub(crate) async fn stop(&self) -> SessionSnapshot {
        self.transition(SessionState::Terminated, None);
        let flushed = self.buffer.flush_all().await;
        self.cancel.cancel();
        self.join_lifecycle().await;
        info!(tenant_id = %self.tenant_id, flushed, "session stopped");
        self.snapshot()
    }

    /// Tear down without flushing and forget the in-memory credentials.
    ///
    /// Pending aggregation windows are discarded and any in-progress
    /// handshake or backoff is aborted. Deleting persisted credentials is
    /// the manager's job.
    pub(crate) async fn reset(&self) -> SessionSnapshot {
        self.transition(SessionState::Terminated, None);
        let discarded = self.buffer.discard().await;
        self.cancel.cancel();
        self.join_lifecycle().await;
        self.record().auth_artifact = None;
        info!(tenant_id = %self.tenant_id, discarded, "session reset");
        self.snapshot()
    }

    async fn join_lifecycle(&self) {
        let handle = self.task.lock().await.take();
        let Some(mut handle) = handle else {
            return;
        };
        if tokio::time::timeout(LIFECYCLE_JOIN_TIMEOUT, &mut handle)
            .await
            .is_err()
        {
            warn!(
                tenant_id = %self.tenant_id,
                "lifecycle task did not finish in time, aborting"
            );
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tenant_id", &self.tenant_id)
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDispatcher;
    use botline_types::tenant::SenderId;

    fn session() -> (Arc<Session>, mpsc::Receiver<OutboundCommand>, EventBus) {
        let events = EventBus::new(64);
        let (session, rx) = Session::new(
            TenantId::new("6"),
            BufferPolicy::default(),
            Arc::new(BoxDispatcher::new(RecordingDispatcher::new())),
            events.clone(),
        );
        (session, rx, events)
    }

    #[tokio::test]
    async fn new_session_is_idle() {
        let (session, _rx, _events) = session();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(snapshot.reconnect_attempts, 0);
        assert!(!snapshot.has_auth_artifact);
        assert_eq!(snapshot.buffered_messages, 0);
    }

    #[tokio::test]
    async fn transition_publishes_state_changed() {
        let (session, _rx, events) = session();
        let mut rx = events.subscribe();

        assert!(session.transition(SessionState::Authenticating, None));

        match rx.recv().await.unwrap() {
            SessionEvent::StateChanged { from, to, reason, .. } => {
                assert_eq!(from, SessionState::Idle);
                assert_eq!(to, SessionState::Authenticating);
                assert!(reason.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let (session, _rx, _events) = session();
        assert!(!session.transition(SessionState::Connected, None));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn terminated_is_absorbing() {
        let (session, _rx, _events) = session();
        assert!(session.transition(SessionState::Terminated, None));
        assert!(!session.transition(SessionState::Authenticating, None));
        assert!(!session.transition(SessionState::Terminated, None));
        assert!(!session.is_live());
    }

    #[tokio::test]
    async fn connected_resets_attempts_and_failure() {
        let (session, _rx, _events) = session();
        session.transition(SessionState::Authenticating, None);
        session.transition(
            SessionState::Disconnected,
            Some(SessionError::HandshakeRejected {
                reason: "bad qr".into(),
            }),
        );
        session.increment_attempts();
        session.increment_attempts();
        assert_eq!(session.snapshot().reconnect_attempts, 2);
        assert!(session.snapshot().last_failure.is_some());

        session.transition(SessionState::ReconnectPending, None);
        session.transition(SessionState::Authenticating, None);
        session.transition(SessionState::Connected, None);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.reconnect_attempts, 0);
        assert!(snapshot.last_failure.is_none());
    }

    #[tokio::test]
    async fn send_requires_connected() {
        let (session, _rx, _events) = session();
        let err = session
            .send(OutboundMessage {
                recipient: SenderId::from("5511"),
                payload: "hi".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn send_hands_message_to_lifecycle() {
        let (session, mut rx, _events) = session();
        session.transition(SessionState::Authenticating, None);
        session.transition(SessionState::Connected, None);

        let responder = tokio::spawn(async move {
            let command = rx.recv().await.unwrap();
            assert_eq!(command.message.payload, "hi");
            command.reply.send(Ok(())).unwrap();
        });

        session
            .send(OutboundMessage {
                recipient: SenderId::from("5511"),
                payload: "hi".into(),
            })
            .await
            .unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_state_returns_early_on_termination() {
        let (session, _rx, _events) = session();
        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .wait_for_state(SessionState::Connected, Duration::from_secs(30))
                    .await
            })
        };
        tokio::task::yield_now().await;
        session.transition(SessionState::Terminated, None);
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn reset_forgets_in_memory_artifact() {
        let (session, _rx, _events) = session();
        session.set_auth_artifact(AuthArtifact::new(b"creds".to_vec()));
        assert!(session.snapshot().has_auth_artifact);

        let snapshot = session.reset().await;
        assert_eq!(snapshot.state, SessionState::Terminated);
        assert!(!snapshot.has_auth_artifact);
    }

    #[tokio::test]
    async fn stop_keeps_in_memory_artifact() {
        let (session, _rx, _events) = session();
        session.set_auth_artifact(AuthArtifact::new(b"creds".to_vec()));

        let snapshot = session.stop().await;
        assert_eq!(snapshot.state, SessionState::Terminated);
        assert!(snapshot.has_auth_artifact);
    }
}
