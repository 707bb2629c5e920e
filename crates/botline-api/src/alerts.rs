//! Operational alert channel: turns alert-worthy session events into log lines.

use botline_core::event::{EventBus, EventFilter, EventStream};
use botline_types::event::SessionEvent;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Log every alert on `bus` until cancelled or the bus closes.
pub fn spawn_event_logger(bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
    spawn_stream_logger(bus.watch(EventFilter::alerts()), cancel)
}

fn spawn_stream_logger(mut alerts: EventStream, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = alerts.next() => event,
            };
            match event {
                Some(event) => log_alert(&event),
                None => break,
            }
        }
    })
}

fn log_alert(event: &SessionEvent) {
    match event {
        SessionEvent::RetryExhausted {
            tenant_id,
            error,
            message_count,
        } => {
            error!(tenant_id = %tenant_id, message_count, %error, "ALERT: batch dropped after retries");
        }
        SessionEvent::StateChanged {
            tenant_id,
            reason: Some(reason),
            ..
        } => {
            warn!(tenant_id = %tenant_id, %reason, "session gave up");
        }
        SessionEvent::SessionEvicted { tenant_id, idle_secs } => {
            info!(tenant_id = %tenant_id, idle_secs, "idle session evicted");
        }
        SessionEvent::AuthPurged { tenant_id } => {
            info!(tenant_id = %tenant_id, "credentials purged");
        }
        SessionEvent::StateChanged { .. } | SessionEvent::BatchDispatched { .. } => {}
    }
}
