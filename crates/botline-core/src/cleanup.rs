//! Periodic eviction of idle sessions.
//!
//! Every `interval` the scheduler stops live sessions whose last activity is
//! older than `inactive_timeout`. Eviction is a graceful stop: buffered
//! messages are flushed and persisted credentials are kept. Sweeps never
//! overlap; a sweep that overruns delays the next tick.

use std::sync::Arc;

use botline_types::config::CleanupPolicy;
use botline_types::tenant::TenantId;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::repository::AuthStore;
use crate::session::SessionManager;
use crate::transport::TransportFactory;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Live sessions examined.
    pub inspected: usize,
    /// Tenants whose sessions were stopped.
    pub evicted: Vec<TenantId>,
}

/// Idle-session janitor bound to a session manager.
pub struct CleanupScheduler<F: TransportFactory, A: AuthStore> {
    manager: Arc<SessionManager<F, A>>,
    policy: CleanupPolicy,
}

impl<F: TransportFactory, A: AuthStore> CleanupScheduler<F, A> {
    pub fn new(manager: Arc<SessionManager<F, A>>) -> Self {
        let policy = manager.config().cleanup.clone();
        Self { manager, policy }
    }

    pub fn policy(&self) -> &CleanupPolicy {
        &self.policy
    }

    /// Run one sweep against the wall clock.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep as if the current time were `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let threshold = self.policy.inactive_timeout();
        let mut report = SweepReport::default();

        for snapshot in self.manager.list() {
            if snapshot.state.is_terminated() {
                continue;
            }
            report.inspected += 1;
            if snapshot.idle_for(now) <= threshold {
                continue;
            }
            if self
                .manager
                .evict_if_idle(&snapshot.tenant_id, now, threshold)
                .await
            {
                report.evicted.push(snapshot.tenant_id);
            }
        }
        report
    }

    /// Start the periodic sweep. Returns `None` when automatic cleanup is
    /// disabled.
    pub fn spawn(self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.policy.auto_cleanup {
            info!("automatic session cleanup disabled");
            return None;
        }

        let period = self.policy.interval();
        info!(
            interval_ms = self.policy.interval_ms,
            inactive_timeout_ms = self.policy.inactive_timeout_ms,
            "session cleanup scheduled"
        );

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.sweep().await;
                        if report.evicted.is_empty() {
                            debug!(inspected = report.inspected, "cleanup sweep found nothing idle");
                        } else {
                            info!(
                                inspected = report.inspected,
                                evicted = report.evicted.len(),
                                "cleanup sweep evicted idle sessions"
                            );
                        }
                    }
                }
            }
            debug!("session cleanup stopped");
        }))
    }
}
