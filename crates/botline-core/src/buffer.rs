//! Per-sender inbound aggregation buffer with dispatch retry.
//!
//! Messages from the same sender that arrive within the aggregation window
//! are combined into one batch. Every new message resets the sender's
//! window; when the window elapses without further messages the batch is
//! handed to the dispatcher. Failed dispatches are retried a bounded number
//! of times with a fixed delay; after that the batch is dropped and a
//! `RetryExhausted` event is published.
//!
//! Ordering: each sender has a delivery lane (a FIFO async mutex). A batch
//! waits for the previous batch of the same sender to finish, retries
//! included, so batches reach the handler in arrival order and at most one
//! dispatch per sender is in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use botline_types::config::BufferPolicy;
use botline_types::error::SessionError;
use botline_types::event::SessionEvent;
use botline_types::message::InboundMessage;
use botline_types::tenant::{SenderId, TenantId};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::dispatch::BoxDispatcher;
use crate::event::EventBus;

type Lane = Arc<tokio::sync::Mutex<()>>;

/// How the delivery of one batch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The dispatcher accepted the batch after `attempts` calls.
    Delivered { attempts: u32 },
    /// Every attempt failed; the batch was dropped.
    Exhausted(SessionError),
    /// The buffer was discarded before delivery finished.
    Cancelled,
}

/// Aggregation buffer owned by one session.
///
/// Cheap to clone; clones share the same windows and timer tasks.
#[derive(Clone)]
pub struct MessageBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    tenant_id: TenantId,
    policy: BufferPolicy,
    dispatcher: Arc<BoxDispatcher>,
    events: EventBus,
    state: Mutex<BufferState>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

#[derive(Default)]
struct BufferState {
    windows: HashMap<SenderId, Window>,
    lanes: HashMap<SenderId, Lane>,
    next_window_id: u64,
    closed: bool,
}

struct Window {
    id: u64,
    pending: Vec<InboundMessage>,
    deadline: Instant,
    timer: CancellationToken,
}

enum WindowPoll {
    Gone,
    Waiting(Instant),
    Due(Vec<InboundMessage>, Lane),
}

impl BufferState {
    fn poll(&mut self, sender: &SenderId, id: u64, now: Instant) -> WindowPoll {
        let deadline = match self.windows.get(sender) {
            Some(window) if window.id == id => window.deadline,
            _ => return WindowPoll::Gone,
        };
        if deadline > now {
            return WindowPoll::Waiting(deadline);
        }
        let Some(window) = self.windows.remove(sender) else {
            return WindowPoll::Gone;
        };
        let lane = Arc::clone(self.lanes.entry(sender.clone()).or_default());
        WindowPoll::Due(window.pending, lane)
    }

    fn pending_count(&self) -> usize {
        self.windows.values().map(|w| w.pending.len()).sum()
    }
}

impl MessageBuffer {
    /// Create a buffer for `tenant_id`.
    ///
    /// `cancel` should be a child of the owning session's token so that
    /// tearing the session down also stops the timers.
    pub fn new(
        tenant_id: TenantId,
        policy: BufferPolicy,
        dispatcher: Arc<BoxDispatcher>,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                tenant_id,
                policy,
                dispatcher,
                events,
                state: Mutex::new(BufferState::default()),
                cancel,
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Add a message to its sender's window, opening a window if needed.
    ///
    /// Returns `false` if the buffer no longer accepts messages.
    pub fn push(&self, message: InboundMessage) -> bool {
        let inner = &self.inner;
        let mut state = inner.state();
        if state.closed {
            warn!(
                tenant_id = %inner.tenant_id,
                sender_id = %message.sender_id,
                "buffer closed, dropping inbound message"
            );
            return false;
        }

        let deadline = Instant::now() + inner.policy.window();
        if let Some(window) = state.windows.get_mut(&message.sender_id) {
            window.pending.push(message);
            window.deadline = deadline;
            return true;
        }

        let id = state.next_window_id;
        state.next_window_id += 1;
        let sender = message.sender_id.clone();
        let timer = inner.cancel.child_token();
        state.windows.insert(
            sender.clone(),
            Window {
                id,
                pending: vec![message],
                deadline,
                timer: timer.clone(),
            },
        );

        let task_inner = Arc::clone(inner);
        inner
            .tracker
            .spawn(async move { task_inner.run_window(sender, id, timer).await });
        true
    }

    /// Messages currently waiting in open windows.
    pub fn pending_count(&self) -> usize {
        self.inner.state().pending_count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state().closed
    }

    /// Close the buffer and deliver every open window now.
    ///
    /// Waits for all deliveries, including ones already in flight, to finish
    /// their retry cycle. Returns the number of messages that were still
    /// waiting in windows.
    pub async fn flush_all(&self) -> usize {
        let inner = &self.inner;
        let drained = {
            let mut state = inner.state();
            state.closed = true;
            let windows: Vec<(SenderId, Window)> = state.windows.drain().collect();
            windows
                .into_iter()
                .map(|(sender, window)| {
                    window.timer.cancel();
                    let lane = Arc::clone(state.lanes.entry(sender.clone()).or_default());
                    (sender, window.pending, lane)
                })
                .collect::<Vec<_>>()
        };

        let count = drained.iter().map(|(_, batch, _)| batch.len()).sum();
        if count > 0 {
            debug!(tenant_id = %inner.tenant_id, messages = count, "flushing buffered messages");
        }

        futures_util::future::join_all(
            drained
                .into_iter()
                .map(|(sender, batch, lane)| async move { inner.deliver(&sender, batch, lane).await }),
        )
        .await;

        inner.tracker.close();
        inner.tracker.wait().await;
        count
    }

    /// Close the buffer and drop everything without dispatching.
    ///
    /// In-flight deliveries and retry waits are cancelled. Returns the number
    /// of messages that were discarded from open windows.
    pub async fn discard(&self) -> usize {
        let inner = &self.inner;
        let dropped = {
            let mut state = inner.state();
            state.closed = true;
            let dropped = state.pending_count();
            state.windows.clear();
            state.lanes.clear();
            dropped
        };
        if dropped > 0 {
            warn!(tenant_id = %inner.tenant_id, messages = dropped, "discarding buffered messages");
        }

        inner.cancel.cancel();
        inner.tracker.close();
        inner.tracker.wait().await;
        dropped
    }
}

impl std::fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("tenant_id", &self.inner.tenant_id)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl BufferInner {
    fn state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Timer task for one window: sleeps until the (possibly extended)
    /// deadline, then delivers the batch.
    async fn run_window(self: Arc<Self>, sender: SenderId, id: u64, timer: CancellationToken) {
        loop {
            let polled = self.state().poll(&sender, id, Instant::now());
            match polled {
                WindowPoll::Gone => return,
                WindowPoll::Waiting(deadline) => {
                    tokio::select! {
                        _ = timer.cancelled() => return,
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                WindowPoll::Due(batch, lane) => {
                    self.deliver(&sender, batch, lane).await;
                    return;
                }
            }
        }
    }

    /// Wait for the sender's lane, then dispatch with retry.
    async fn deliver(&self, sender: &SenderId, batch: Vec<InboundMessage>, lane: Lane) -> FlushOutcome {
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => FlushOutcome::Cancelled,
            _guard = Arc::clone(&lane).lock_owned() => {
                self.dispatch_with_retry(sender, &batch).await
            }
        };
        self.release_lane(sender, &lane);
        outcome
    }

    /// Forget the lane once nobody else is queued on it.
    fn release_lane(&self, sender: &SenderId, lane: &Lane) {
        let mut state = self.state();
        let idle = state
            .lanes
            .get(sender)
            .is_some_and(|current| Arc::ptr_eq(current, lane) && Arc::strong_count(lane) <= 2);
        if idle {
            state.lanes.remove(sender);
        }
    }

    async fn dispatch_with_retry(&self, sender: &SenderId, batch: &[InboundMessage]) -> FlushOutcome {
        let max_attempts = self.policy.max_retry_count.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return FlushOutcome::Cancelled,
                result = self.dispatcher.dispatch(&self.tenant_id, sender, batch) => result,
            };

            let last = match result {
                Ok(()) => {
                    debug!(
                        tenant_id = %self.tenant_id,
                        sender_id = %sender,
                        messages = batch.len(),
                        attempts = attempt,
                        "batch dispatched"
                    );
                    self.events.publish(SessionEvent::BatchDispatched {
                        tenant_id: self.tenant_id.clone(),
                        sender_id: sender.clone(),
                        message_count: batch.len(),
                        attempts: attempt,
                    });
                    return FlushOutcome::Delivered { attempts: attempt };
                }
                Err(error) => error,
            };

            if attempt >= max_attempts {
                let failure = SessionError::RetryExhausted {
                    sender_id: sender.clone(),
                    attempts: attempt,
                    last_error: Box::new(last),
                };
                error!(
                    tenant_id = %self.tenant_id,
                    sender_id = %sender,
                    messages = batch.len(),
                    error = %failure,
                    "dropping batch after exhausting dispatch retries"
                );
                self.events.publish(SessionEvent::RetryExhausted {
                    tenant_id: self.tenant_id.clone(),
                    error: failure.clone(),
                    message_count: batch.len(),
                });
                return FlushOutcome::Exhausted(failure);
            }

            warn!(
                tenant_id = %self.tenant_id,
                sender_id = %sender,
                attempt,
                max_attempts,
                error = %last,
                "dispatch failed, retrying"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return FlushOutcome::Cancelled,
                _ = tokio::time::sleep(self.policy.retry_delay()) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
