//! Reconnection controller.
//!
//! Decides what a session does after it lands in `Disconnected`: go to
//! `ReconnectPending` and try again after a constant backoff, or give up and
//! terminate. The backoff wait is cancellable so `stop`/`reset` can abort a
//! pending attempt immediately.

use std::time::Duration;

use botline_types::config::ReconnectionPolicy;
use botline_types::error::SessionError;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// ReconnectDecision
// ---------------------------------------------------------------------------

/// What to do with a session that just disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then run reconnection attempt number `attempt` (1-based).
    Retry { delay: Duration, attempt: u32 },
    /// Reconnection is disabled or the attempt budget is spent.
    GiveUp,
}

// ---------------------------------------------------------------------------
// ReconnectController
// ---------------------------------------------------------------------------

/// Policy-driven reconnection decisions for one session.
#[derive(Debug, Clone)]
pub struct ReconnectController {
    policy: ReconnectionPolicy,
}

impl ReconnectController {
    pub fn new(policy: ReconnectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ReconnectionPolicy {
        &self.policy
    }

    /// Bound applied to every handshake.
    pub fn handshake_timeout(&self) -> Duration {
        self.policy.handshake_timeout()
    }

    /// Whether failed handshakes count against the attempt budget.
    ///
    /// With reconnection disabled there is no budget and the counter stays
    /// at zero.
    pub fn counts_failures(&self) -> bool {
        self.policy.enabled
    }

    /// Decide the next step after `failure`, given the failed handshakes so
    /// far. Only transport failures are recoverable.
    pub fn decide_after(&self, failure: &SessionError, attempts: u32) -> ReconnectDecision {
        if !failure.is_transport_failure() {
            return ReconnectDecision::GiveUp;
        }
        self.decide(attempts)
    }

    /// Decide the next step given the failed handshakes so far.
    pub fn decide(&self, attempts: u32) -> ReconnectDecision {
        if !self.policy.enabled || attempts >= self.policy.max_attempts {
            return ReconnectDecision::GiveUp;
        }
        ReconnectDecision::Retry {
            delay: self.policy.backoff(),
            attempt: attempts + 1,
        }
    }

    /// Sleep for `delay` unless `cancel` fires first.
    ///
    /// Returns `true` when the delay elapsed, `false` when cancelled.
    pub async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
