//! In-memory fakes for the core ports, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use botline_types::error::{AuthStoreError, SessionError};
use botline_types::message::{InboundMessage, OutboundMessage};
use botline_types::session::AuthArtifact;
use botline_types::tenant::{SenderId, TenantId};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::dispatch::Dispatcher;
use crate::repository::AuthStore;
use crate::transport::{Handshake, Transport, TransportEvent, TransportFactory};

// ---------------------------------------------------------------------------
// RecordingDispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DispatchCall {
    pub tenant_id: TenantId,
    pub sender_id: SenderId,
    pub payloads: Vec<String>,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct DispatcherState {
    calls: Vec<DispatchCall>,
    /// Remaining failures before calls start succeeding. `None` = always fail.
    failures_left: Option<u32>,
    failing: bool,
    reason: String,
    delay: Option<Duration>,
}

/// Dispatcher that records every call and fails on demand.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    state: Arc<Mutex<DispatcherState>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_always(reason: &str) -> Self {
        let dispatcher = Self::new();
        {
            let mut state = dispatcher.state.lock().unwrap();
            state.failing = true;
            state.failures_left = None;
            state.reason = reason.to_string();
        }
        dispatcher
    }

    pub fn failing_times(times: u32, reason: &str) -> Self {
        let dispatcher = Self::new();
        {
            let mut state = dispatcher.state.lock().unwrap();
            state.failing = true;
            state.failures_left = Some(times);
            state.reason = reason.to_string();
        }
        dispatcher
    }

    /// Make every call take `delay` before returning.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<DispatchCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
        batch: &[InboundMessage],
    ) -> Result<(), SessionError> {
        let (delay, outcome) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(DispatchCall {
                tenant_id: tenant_id.clone(),
                sender_id: sender_id.clone(),
                payloads: batch.iter().map(|m| m.payload.clone()).collect(),
                at: Instant::now(),
            });
            let outcome = if !state.failing {
                Ok(())
            } else {
                match state.failures_left {
                    None => Err(SessionError::DispatchFailed {
                        reason: state.reason.clone(),
                    }),
                    Some(0) => Ok(()),
                    Some(n) => {
                        state.failures_left = Some(n - 1);
                        Err(SessionError::DispatchFailed {
                            reason: state.reason.clone(),
                        })
                    }
                }
            };
            (state.delay, outcome)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// MemoryAuthStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryAuthStore {
    artifacts: Arc<Mutex<HashMap<TenantId, AuthArtifact>>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: &TenantId, artifact: AuthArtifact) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(tenant_id.clone(), artifact);
    }

    pub fn get(&self, tenant_id: &TenantId) -> Option<AuthArtifact> {
        self.artifacts.lock().unwrap().get(tenant_id).cloned()
    }
}

impl AuthStore for MemoryAuthStore {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<AuthArtifact>, AuthStoreError> {
        Ok(self.get(tenant_id))
    }

    async fn save(&self, tenant_id: &TenantId, artifact: &AuthArtifact) -> Result<(), AuthStoreError> {
        self.insert(tenant_id, artifact.clone());
        Ok(())
    }

    async fn delete(&self, tenant_id: &TenantId) -> Result<(), AuthStoreError> {
        self.artifacts.lock().unwrap().remove(tenant_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeNetwork
// ---------------------------------------------------------------------------

/// How the next handshake for a tenant behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectPlan {
    Succeed,
    Reject(String),
    /// Fails with an arbitrary error.
    Fail(SessionError),
    /// Never completes; only the handshake timeout or cancellation ends it.
    Hang,
}

#[derive(Debug)]
struct NetworkState {
    default_plan: ConnectPlan,
    plans: HashMap<TenantId, VecDeque<ConnectPlan>>,
    connects: HashMap<TenantId, u32>,
    presented: HashMap<TenantId, Vec<Option<AuthArtifact>>>,
    links: HashMap<TenantId, mpsc::Sender<TransportEvent>>,
    sent: Vec<(TenantId, OutboundMessage)>,
    closes: HashMap<TenantId, u32>,
}

/// Scriptable stand-in for the chat network shared by every fake transport.
#[derive(Debug, Clone)]
pub struct FakeNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::with_default(ConnectPlan::Succeed)
    }

    pub fn with_default(plan: ConnectPlan) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState {
                default_plan: plan,
                plans: HashMap::new(),
                connects: HashMap::new(),
                presented: HashMap::new(),
                links: HashMap::new(),
                sent: Vec::new(),
                closes: HashMap::new(),
            })),
        }
    }

    pub fn factory(&self) -> FakeTransportFactory {
        FakeTransportFactory {
            network: self.clone(),
        }
    }

    pub fn set_default(&self, plan: ConnectPlan) {
        self.state.lock().unwrap().default_plan = plan;
    }

    /// Queue plans consumed by the next handshakes of `tenant_id`.
    pub fn plan(&self, tenant_id: &str, plans: impl IntoIterator<Item = ConnectPlan>) {
        self.state
            .lock()
            .unwrap()
            .plans
            .entry(TenantId::new(tenant_id))
            .or_default()
            .extend(plans);
    }

    pub fn connect_count(&self, tenant_id: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.connects.get(&TenantId::new(tenant_id)).copied().unwrap_or(0)
    }

    pub fn presented(&self, tenant_id: &str) -> Vec<Option<AuthArtifact>> {
        let state = self.state.lock().unwrap();
        state
            .presented
            .get(&TenantId::new(tenant_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn close_count(&self, tenant_id: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.closes.get(&TenantId::new(tenant_id)).copied().unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<(TenantId, OutboundMessage)> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Deliver a message from `sender` on the tenant's live connection.
    pub async fn inject(&self, tenant_id: &str, sender: &str, payload: &str) -> bool {
        let event = TransportEvent::Message(InboundMessage::new(SenderId::from(sender), payload));
        self.emit(tenant_id, event).await
    }

    /// Simulate the connection dropping.
    pub async fn drop_link(&self, tenant_id: &str, reason: &str) -> bool {
        let event = TransportEvent::Disconnected {
            reason: reason.to_string(),
        };
        self.emit(tenant_id, event).await
    }

    async fn emit(&self, tenant_id: &str, event: TransportEvent) -> bool {
        let link = self
            .state
            .lock()
            .unwrap()
            .links
            .get(&TenantId::new(tenant_id))
            .cloned();
        match link {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeTransportFactory {
    network: FakeNetwork,
}

impl TransportFactory for FakeTransportFactory {
    type Transport = FakeTransport;

    fn create(&self, tenant_id: &TenantId) -> FakeTransport {
        FakeTransport {
            tenant_id: tenant_id.clone(),
            network: self.network.clone(),
        }
    }
}

#[derive(Debug)]
pub struct FakeTransport {
    tenant_id: TenantId,
    network: FakeNetwork,
}

impl Transport for FakeTransport {
    async fn connect(&self, artifact: Option<AuthArtifact>) -> Result<Handshake, SessionError> {
        let plan = {
            let mut state = self.network.state.lock().unwrap();
            *state.connects.entry(self.tenant_id.clone()).or_default() += 1;
            state
                .presented
                .entry(self.tenant_id.clone())
                .or_default()
                .push(artifact);
            let default = state.default_plan.clone();
            state
                .plans
                .get_mut(&self.tenant_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(default)
        };

        match plan {
            ConnectPlan::Succeed => {
                let (tx, rx) = mpsc::channel(64);
                self.network
                    .state
                    .lock()
                    .unwrap()
                    .links
                    .insert(self.tenant_id.clone(), tx);
                Ok(Handshake {
                    artifact: Some(AuthArtifact::new(format!("creds-{}", self.tenant_id))),
                    events: rx,
                })
            }
            ConnectPlan::Reject(reason) => Err(SessionError::HandshakeRejected { reason }),
            ConnectPlan::Fail(error) => Err(error),
            ConnectPlan::Hang => std::future::pending().await,
        }
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), SessionError> {
        self.network
            .state
            .lock()
            .unwrap()
            .sent
            .push((self.tenant_id.clone(), message.clone()));
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.network.state.lock().unwrap();
        state.links.remove(&self.tenant_id);
        *state.closes.entry(self.tenant_id.clone()).or_default() += 1;
    }
}
