//! Gateway configuration types.
//!
//! `GatewayConfig` is built once at startup (defaults, then `config.toml`,
//! then environment overrides) and shared read-only afterwards. All fields
//! have sensible defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

/// Lower bound for timer periods that would otherwise spin at zero.
const MIN_TIMER_MS: u64 = 1;

/// Upper bound for any configured delay (ten years), so deadlines computed
/// from it never overflow the clock.
const MAX_TIMER_MS: u64 = 10 * 365 * 24 * 60 * 60 * 1_000;

fn period(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_TIMER_MS, MAX_TIMER_MS))
}

fn delay(ms: u64) -> Duration {
    Duration::from_millis(ms.min(MAX_TIMER_MS))
}

/// Top-level configuration for the session gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub auto_start: AutoStartPolicy,

    #[serde(default)]
    pub reconnection: ReconnectionPolicy,

    #[serde(default)]
    pub buffer: BufferPolicy,

    #[serde(default)]
    pub cleanup: CleanupPolicy,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl GatewayConfig {
    /// Tenants to start at boot; empty when auto-start is disabled.
    pub fn auto_start_tenants(&self) -> &[TenantId] {
        if self.auto_start.enabled {
            &self.auto_start.tenants
        } else {
            &[]
        }
    }
}

/// Which tenants get a session at boot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoStartPolicy {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub tenants: Vec<TenantId>,
}

/// Whether and how a disconnected session re-authenticates.
///
/// Disabled by default: a dropped session terminates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectionPolicy {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Constant delay between reconnection attempts.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Upper bound on a single handshake.
    #[serde(default = "default_handshake_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    5_000
}

fn default_handshake_timeout_ms() -> u64 {
    60_000
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl ReconnectionPolicy {
    pub fn backoff(&self) -> Duration {
        delay(self.backoff_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        period(self.timeout_ms)
    }
}

/// Inbound aggregation and dispatch retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPolicy {
    /// Quiet period after the last message before a sender's batch flushes.
    #[serde(default = "default_buffer_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first failed dispatch of a batch.
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_buffer_timeout_ms() -> u64 {
    3_000
}

fn default_max_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: default_buffer_timeout_ms(),
            max_retry_count: default_max_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl BufferPolicy {
    pub fn window(&self) -> Duration {
        period(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        delay(self.retry_delay_ms)
    }
}

/// Idle-session eviction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupPolicy {
    #[serde(default = "default_cleanup_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_inactive_timeout_ms")]
    pub inactive_timeout_ms: u64,

    #[serde(default = "default_auto_cleanup")]
    pub auto_cleanup: bool,
}

fn default_cleanup_interval_ms() -> u64 {
    300_000
}

fn default_inactive_timeout_ms() -> u64 {
    1_800_000
}

fn default_auto_cleanup() -> bool {
    true
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            interval_ms: default_cleanup_interval_ms(),
            inactive_timeout_ms: default_inactive_timeout_ms(),
            auto_cleanup: default_auto_cleanup(),
        }
    }
}

impl CleanupPolicy {
    pub fn interval(&self) -> Duration {
        period(self.interval_ms)
    }

    pub fn inactive_timeout(&self) -> chrono::Duration {
        let ms = self.inactive_timeout_ms.min(MAX_TIMER_MS);
        chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
    }
}

/// Settings for the downstream dispatch adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Webhook receiving aggregated batches. Without one, batches are logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            url: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn request_timeout(&self) -> Duration {
        period(self.request_timeout_ms)
    }
}
