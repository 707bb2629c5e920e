//! Persisted auth store trait definition.

use botline_types::error::AuthStoreError;
use botline_types::session::AuthArtifact;
use botline_types::tenant::TenantId;

/// Tenant-scoped storage for opaque credential blobs.
///
/// While a session is live it is the only writer for its tenant. A reset
/// deletes the tenant's entry so the next start performs a fresh handshake.
pub trait AuthStore: Send + Sync + 'static {
    /// Load the stored artifact. Returns `None` if the tenant has none.
    fn load(
        &self,
        tenant_id: &TenantId,
    ) -> impl std::future::Future<Output = Result<Option<AuthArtifact>, AuthStoreError>> + Send;

    /// Store (or replace) the tenant's artifact.
    fn save(
        &self,
        tenant_id: &TenantId,
        artifact: &AuthArtifact,
    ) -> impl std::future::Future<Output = Result<(), AuthStoreError>> + Send;

    /// Remove everything stored for the tenant. Deleting nothing is not an error.
    fn delete(
        &self,
        tenant_id: &TenantId,
    ) -> impl std::future::Future<Output = Result<(), AuthStoreError>> + Send;
}
