//! Registry of tenant sessions and the administrative operations on them.
//!
//! At most one live session exists per tenant. Start, stop, reset and
//! eviction of the same tenant are serialized through a per-tenant admin
//! lock, so concurrent starts collapse into one session and a reset can
//! never interleave with a start.

use std::sync::Arc;
use std::time::Duration;

use botline_types::config::GatewayConfig;
use botline_types::error::SessionError;
use botline_types::event::SessionEvent;
use botline_types::message::OutboundMessage;
use botline_types::session::{SessionSnapshot, SessionState};
use botline_types::tenant::TenantId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::BoxDispatcher;
use crate::event::EventBus;
use crate::reconnect::ReconnectController;
use crate::repository::AuthStore;
use crate::session::handle::Session;
use crate::session::lifecycle::Lifecycle;
use crate::transport::TransportFactory;

/// Result of [`SessionManager::start`].
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// A new session was created and its handshake kicked off.
    Started(Arc<Session>),
    /// The tenant already had a live session; nothing was started.
    AlreadyLive(Arc<Session>),
}

impl StartOutcome {
    pub fn session(&self) -> &Arc<Session> {
        match self {
            StartOutcome::Started(session) | StartOutcome::AlreadyLive(session) => session,
        }
    }

    pub fn into_session(self) -> Arc<Session> {
        match self {
            StartOutcome::Started(session) | StartOutcome::AlreadyLive(session) => session,
        }
    }

    pub fn was_started(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

/// Owns every tenant session.
pub struct SessionManager<F: TransportFactory, A: AuthStore> {
    config: Arc<GatewayConfig>,
    factory: Arc<F>,
    auth_store: Arc<A>,
    dispatcher: Arc<BoxDispatcher>,
    events: EventBus,
    sessions: DashMap<TenantId, Arc<Session>>,
    admin_locks: DashMap<TenantId, Arc<tokio::sync::Mutex<()>>>,
}

impl<F: TransportFactory, A: AuthStore> SessionManager<F, A> {
    pub fn new(
        config: GatewayConfig,
        factory: F,
        auth_store: A,
        dispatcher: BoxDispatcher,
        events: EventBus,
    ) -> Self {
        Self {
            config: Arc::new(config),
            factory: Arc::new(factory),
            auth_store: Arc::new(auth_store),
            dispatcher: Arc::new(dispatcher),
            events,
            sessions: DashMap::new(),
            admin_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn auth_store(&self) -> &A {
        &self.auth_store
    }

    async fn admin_lock(&self, tenant_id: &TenantId) -> AdminGuard<'_> {
        let lock = self
            .admin_locks
            .entry(tenant_id.clone())
            .or_default()
            .value()
            .clone();
        AdminGuard {
            locks: &self.admin_locks,
            tenant_id: tenant_id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn admin_lock_count(&self) -> usize {
        self.admin_locks.len()
    }

    fn live_session(&self, tenant_id: &TenantId) -> Option<Arc<Session>> {
        self.sessions
            .get(tenant_id)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|session| session.is_live())
    }

    /// Start a session for `tenant_id`, or return the live one.
    ///
    /// A terminated session is replaced by a fresh one with zero reconnect
    /// attempts. The new session is in `Authenticating` when this returns.
    pub async fn start(&self, tenant_id: &TenantId) -> StartOutcome {
        let _admin = self.admin_lock(tenant_id).await;

        if let Some(existing) = self.live_session(tenant_id) {
            let notice = SessionError::ConcurrentStartIgnored {
                tenant_id: tenant_id.clone(),
            };
            info!(tenant_id = %tenant_id, state = %existing.state(), "{notice}");
            return StartOutcome::AlreadyLive(existing);
        }

        let (session, outbound_rx) = Session::new(
            tenant_id.clone(),
            self.config.buffer.clone(),
            Arc::clone(&self.dispatcher),
            self.events.clone(),
        );
        self.sessions.insert(tenant_id.clone(), Arc::clone(&session));
        session.transition(SessionState::Authenticating, None);

        let lifecycle = Lifecycle::new(
            Arc::clone(&session),
            self.factory.create(tenant_id),
            Arc::clone(&self.auth_store),
            ReconnectController::new(self.config.reconnection.clone()),
            outbound_rx,
        );
        session.attach(tokio::spawn(lifecycle.run())).await;

        info!(tenant_id = %tenant_id, session_id = %session.session_id(), "session started");
        StartOutcome::Started(session)
    }

    /// Look up the current session of a tenant.
    pub fn get(&self, tenant_id: &TenantId) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(tenant_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SessionError::not_found(tenant_id))
    }

    pub fn status(&self, tenant_id: &TenantId) -> Result<SessionSnapshot, SessionError> {
        Ok(self.get(tenant_id)?.snapshot())
    }

    /// Snapshots of every known session, ordered by tenant id.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut snapshots: Vec<SessionSnapshot> = sessions.iter().map(|s| s.snapshot()).collect();
        snapshots.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        snapshots
    }

    /// Gracefully stop a tenant's session, flushing buffered messages.
    /// Persisted credentials are kept.
    pub async fn stop(&self, tenant_id: &TenantId) -> Result<SessionSnapshot, SessionError> {
        let _admin = self.admin_lock(tenant_id).await;
        let session = self.get(tenant_id)?;
        Ok(session.stop().await)
    }

    /// Terminate a tenant's session and purge its persisted credentials.
    ///
    /// Works from any state, including mid-handshake and mid-backoff. A
    /// tenant without a session still gets its credentials purged.
    pub async fn reset(&self, tenant_id: &TenantId) -> Result<SessionSnapshot, SessionError> {
        let _admin = self.admin_lock(tenant_id).await;

        let snapshot = match self.get(tenant_id) {
            Ok(session) => session.reset().await,
            Err(_) => {
                let now = Utc::now();
                SessionSnapshot {
                    tenant_id: tenant_id.clone(),
                    session_id: Uuid::nil(),
                    state: SessionState::Terminated,
                    reconnect_attempts: 0,
                    created_at: now,
                    last_activity_at: now,
                    has_auth_artifact: false,
                    buffered_messages: 0,
                    last_failure: None,
                }
            }
        };

        self.auth_store.delete(tenant_id).await?;
        info!(tenant_id = %tenant_id, "persisted credentials purged");
        self.events.publish(SessionEvent::AuthPurged {
            tenant_id: tenant_id.clone(),
        });
        Ok(snapshot)
    }

    /// Wait until the tenant's current session reaches `target`.
    ///
    /// Returns `Ok(false)` on timeout or if the session terminates first.
    pub async fn wait_for_state(
        &self,
        tenant_id: &TenantId,
        target: SessionState,
        timeout: Duration,
    ) -> Result<bool, SessionError> {
        let session = self.get(tenant_id)?;
        Ok(session.wait_for_state(target, timeout).await)
    }

    /// Send an outbound message through a tenant's connection.
    pub async fn send(&self, tenant_id: &TenantId, message: OutboundMessage) -> Result<(), SessionError> {
        self.get(tenant_id)?.send(message).await
    }

    /// Stop a live session if it has been idle longer than `threshold` as of
    /// `now`. Returns whether it was evicted.
    pub async fn evict_if_idle(
        &self,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
        threshold: chrono::Duration,
    ) -> bool {
        let _admin = self.admin_lock(tenant_id).await;

        let Ok(session) = self.get(tenant_id) else {
            return false;
        };
        if !session.is_live() {
            return false;
        }
        let idle = now - session.last_activity_at();
        if idle <= threshold {
            return false;
        }

        session.stop().await;
        info!(
            tenant_id = %tenant_id,
            idle_secs = idle.num_seconds(),
            "evicted idle session"
        );
        self.events.publish(SessionEvent::SessionEvicted {
            tenant_id: tenant_id.clone(),
            idle_secs: idle.num_seconds(),
        });
        true
    }

    /// Start every configured auto-start tenant. Each start is independent.
    pub async fn boot(&self) -> Vec<TenantId> {
        let tenants = self.config.auto_start_tenants().to_vec();
        if tenants.is_empty() {
            info!("no tenants configured for auto-start");
            return tenants;
        }

        let mut started = Vec::with_capacity(tenants.len());
        for tenant_id in tenants {
            if self.start(&tenant_id).await.was_started() {
                started.push(tenant_id);
            }
        }
        info!(count = started.len(), "auto-started tenant sessions");
        started
    }

    /// Stop every live session in parallel.
    pub async fn shutdown(&self) {
        let live: Vec<TenantId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_live())
            .map(|entry| entry.key().clone())
            .collect();
        if live.is_empty() {
            return;
        }

        info!(count = live.len(), "stopping live sessions");
        let results = futures_util::future::join_all(live.iter().map(|tenant_id| self.stop(tenant_id))).await;
        for (tenant_id, result) in live.iter().zip(results) {
            if let Err(e) = result {
                warn!(tenant_id = %tenant_id, error = %e, "failed to stop session during shutdown");
            }
        }
    }
}

/// Serializes admin operations on one tenant. The map entry is dropped with
/// the last guard so unknown tenant ids leave nothing behind.
struct AdminGuard<'a> {
    locks: &'a DashMap<TenantId, Arc<tokio::sync::Mutex<()>>>,
    tenant_id: TenantId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AdminGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold a clone of the Arc, so the entry survives while anyone queues on it.
        self.locks
            .remove_if(&self.tenant_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl<F: TransportFactory, A: AuthStore> std::fmt::Debug for SessionManager<F, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
