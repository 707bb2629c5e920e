//! Gateway-wide event bus with per-tenant and alert-only views.
//!
//! Every session publishes onto one `tokio::sync::broadcast` channel. Raw
//! receivers see everything; an [`EventStream`] narrows that down to one
//! tenant and/or to alert-worthy events, and keeps count of what it missed
//! when it falls behind instead of surfacing `Lagged` to the caller.

use botline_types::event::SessionEvent;
use botline_types::tenant::TenantId;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

/// Default channel capacity for the gateway-wide bus.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Multi-producer, multi-consumer bus for session events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Unfiltered receiver for all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Filtered stream of future events.
    pub fn watch(&self, filter: EventFilter) -> EventStream {
        EventStream {
            rx: self.sender.subscribe(),
            filter,
            missed: 0,
        }
    }

    /// Publish an event. Dropped when nobody is listening.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

/// Which events an [`EventStream`] yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    tenant: Option<TenantId>,
    alerts_only: bool,
}

impl EventFilter {
    /// Everything on the bus.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only events concerning `tenant_id`.
    pub fn tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant: Some(tenant_id),
            alerts_only: false,
        }
    }

    /// Only events for which [`SessionEvent::is_alert`] holds.
    pub fn alerts() -> Self {
        Self {
            tenant: None,
            alerts_only: true,
        }
    }

    /// Narrow an existing filter to alerts.
    pub fn alerts_only(mut self) -> Self {
        self.alerts_only = true;
        self
    }

    pub fn matches(&self, event: &SessionEvent) -> bool {
        if self.alerts_only && !event.is_alert() {
            return false;
        }
        self.tenant.as_ref().is_none_or(|t| t == event.tenant_id())
    }
}

/// A filtered subscription to the bus.
#[derive(Debug)]
pub struct EventStream {
    rx: broadcast::Receiver<SessionEvent>,
    filter: EventFilter,
    missed: u64,
}

impl EventStream {
    /// Next matching event, or `None` once every publisher is gone.
    ///
    /// Falling behind the channel skips the overwritten events, logs a
    /// warning and keeps going; see [`EventStream::missed`].
    pub async fn next(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`EventStream::next`]: `None` when nothing
    /// matching is queued right now.
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Events overwritten before this stream could read them.
    ///
    /// Counts every lost event, matching the filter or not, since the
    /// channel cannot tell which ones they were.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    fn record_lag(&mut self, skipped: u64) {
        self.missed += skipped;
        warn!(skipped, total = self.missed, "event stream fell behind the bus");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botline_types::error::SessionError;
    use botline_types::session::SessionState;

    fn purged(tenant: &str) -> SessionEvent {
        SessionEvent::AuthPurged {
            tenant_id: TenantId::new(tenant),
        }
    }

    fn dispatched(tenant: &str) -> SessionEvent {
        SessionEvent::BatchDispatched {
            tenant_id: TenantId::new(tenant),
            sender_id: "5511".into(),
            message_count: 2,
            attempts: 1,
        }
    }

    #[tokio::test]
    async fn tenant_stream_skips_other_tenants() {
        let bus = EventBus::new(16);
        let mut stream = bus.watch(EventFilter::tenant(TenantId::new("6")));

        bus.publish(purged("7"));
        bus.publish(dispatched("6"));
        bus.publish(purged("6"));

        assert_eq!(stream.next().await, Some(dispatched("6")));
        assert_eq!(stream.next().await, Some(purged("6")));
        assert_eq!(stream.try_next(), None);
    }

    #[tokio::test]
    async fn alert_stream_ignores_routine_traffic() {
        let bus = EventBus::new(16);
        let mut alerts = bus.watch(EventFilter::alerts());

        bus.publish(dispatched("6"));
        bus.publish(SessionEvent::StateChanged {
            tenant_id: TenantId::new("6"),
            from: SessionState::Connected,
            to: SessionState::Terminated,
            reason: None,
        });
        bus.publish(SessionEvent::RetryExhausted {
            tenant_id: TenantId::new("6"),
            error: SessionError::DispatchFailed {
                reason: "downstream 503".into(),
            },
            message_count: 3,
        });

        let alert = alerts.next().await.unwrap();
        assert!(matches!(alert, SessionEvent::RetryExhausted { message_count: 3, .. }));
        assert_eq!(alerts.try_next(), None);
    }

    #[tokio::test]
    async fn combined_filter_requires_both() {
        let bus = EventBus::new(16);
        let mut stream = bus.watch(EventFilter::tenant(TenantId::new("6")).alerts_only());

        bus.publish(dispatched("6"));
        bus.publish(purged("7"));
        bus.publish(purged("6"));

        assert_eq!(stream.next().await, Some(purged("6")));
        assert_eq!(stream.try_next(), None);
    }

    #[tokio::test]
    async fn lagging_stream_counts_missed_events_and_resumes() {
        let bus = EventBus::new(4);
        let mut stream = bus.watch(EventFilter::all());

        for i in 0..10 {
            bus.publish(SessionEvent::SessionEvicted {
                tenant_id: TenantId::new("6"),
                idle_secs: i,
            });
        }

        // The six oldest were overwritten; the stream picks up at the seventh.
        let first = stream.next().await.unwrap();
        assert_eq!(first, SessionEvent::SessionEvicted { tenant_id: TenantId::new("6"), idle_secs: 6 });
        assert_eq!(stream.missed(), 6);
    }

    #[tokio::test]
    async fn stream_ends_when_bus_is_dropped() {
        let bus = EventBus::new(16);
        let mut stream = bus.watch(EventFilter::all());
        bus.publish(purged("6"));
        drop(bus);

        assert_eq!(stream.next().await, Some(purged("6")));
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn publish_without_listeners_is_dropped() {
        let bus = EventBus::new(16);
        bus.publish(purged("6"));

        let mut late = bus.watch(EventFilter::all());
        assert_eq!(late.try_next(), None);
    }
}
