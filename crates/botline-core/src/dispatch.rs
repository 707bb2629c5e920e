//! Downstream dispatch port and its object-safe wrapper.
//!
//! Follows the same blanket-impl pattern as the other boxed ports:
//! 1. `Dispatcher` is the ergonomic trait with `impl Future` returns
//! 2. `DispatcherDyn` is the object-safe twin with boxed futures
//! 3. `BoxDispatcher` wraps `Box<dyn DispatcherDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use botline_types::error::SessionError;
use botline_types::message::InboundMessage;
use botline_types::tenant::{SenderId, TenantId};

/// Business-logic handler receiving aggregated batches.
///
/// May be slow or fail transiently; the message buffer retries per policy.
/// Adapters report failures as [`SessionError::DispatchFailed`].
pub trait Dispatcher: Send + Sync {
    fn dispatch(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
        batch: &[InboundMessage],
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Object-safe version of [`Dispatcher`] with boxed futures.
pub trait DispatcherDyn: Send + Sync {
    fn dispatch_boxed<'a>(
        &'a self,
        tenant_id: &'a TenantId,
        sender_id: &'a SenderId,
        batch: &'a [InboundMessage],
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>>;
}

impl<T: Dispatcher> DispatcherDyn for T {
    fn dispatch_boxed<'a>(
        &'a self,
        tenant_id: &'a TenantId,
        sender_id: &'a SenderId,
        batch: &'a [InboundMessage],
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>> {
        Box::pin(self.dispatch(tenant_id, sender_id, batch))
    }
}

/// Type-erased dispatcher so sessions do not carry a generic parameter.
pub struct BoxDispatcher {
    inner: Box<dyn DispatcherDyn>,
}

impl BoxDispatcher {
    pub fn new<T: Dispatcher + 'static>(dispatcher: T) -> Self {
        Self {
            inner: Box::new(dispatcher),
        }
    }

    pub async fn dispatch(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
        batch: &[InboundMessage],
    ) -> Result<(), SessionError> {
        self.inner.dispatch_boxed(tenant_id, sender_id, batch).await
    }
}

impl std::fmt::Debug for BoxDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxDispatcher").finish_non_exhaustive()
    }
}
