//! File-backed credential store.
//!
//! Layout: `{data_dir}/auth/{tenant}/creds.bin`. A reset removes the whole
//! tenant directory so the next start pairs from scratch.

use std::path::{Path, PathBuf};

use botline_core::repository::AuthStore;
use botline_types::error::AuthStoreError;
use botline_types::session::AuthArtifact;
use botline_types::tenant::TenantId;

const CREDS_FILE: &str = "creds.bin";

/// `AuthStore` that keeps one credential file per tenant.
#[derive(Debug, Clone)]
pub struct FileAuthStore {
    root: PathBuf,
}

impl FileAuthStore {
    /// Store rooted at `{data_dir}/auth`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("auth"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a tenant's credentials.
    ///
    /// The tenant id is percent-encoded into a single path component, so
    /// distinct tenants never share a directory and no id can escape the
    /// store root.
    pub fn tenant_dir(&self, tenant_id: &TenantId) -> PathBuf {
        self.root.join(dir_name(tenant_id.as_str()))
    }

    pub fn creds_path(&self, tenant_id: &TenantId) -> PathBuf {
        self.tenant_dir(tenant_id).join(CREDS_FILE)
    }
}

fn dir_name(id: &str) -> String {
    if id.is_empty() {
        // A bare `%` is never produced by the encoder.
        return "%".to_string();
    }
    // `.` is left alone by the encoder; `.` and `..` must not be components.
    urlencoding::encode(id).replace('.', "%2E")
}

impl AuthStore for FileAuthStore {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<AuthArtifact>, AuthStoreError> {
        match tokio::fs::read(self.creds_path(tenant_id)).await {
            Ok(bytes) if bytes.is_empty() => Err(AuthStoreError::Corrupt(tenant_id.clone())),
            Ok(bytes) => Ok(Some(AuthArtifact::new(bytes))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, tenant_id: &TenantId, artifact: &AuthArtifact) -> Result<(), AuthStoreError> {
        let dir = self.tenant_dir(tenant_id);
        tokio::fs::create_dir_all(&dir).await?;

        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = dir.join(format!("{CREDS_FILE}.tmp"));
        tokio::fs::write(&tmp, artifact.as_bytes()).await?;
        tokio::fs::rename(&tmp, dir.join(CREDS_FILE)).await?;

        tracing::debug!(tenant_id = %tenant_id, bytes = artifact.len(), "credentials saved");
        Ok(())
    }

    async fn delete(&self, tenant_id: &TenantId) -> Result<(), AuthStoreError> {
        match tokio::fs::remove_dir_all(self.tenant_dir(tenant_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = FileAuthStore::new(dir.path());
        assert!(store.load(&TenantId::new("6")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = FileAuthStore::new(dir.path());
        let tenant = TenantId::new("6");

        store
            .save(&tenant, &AuthArtifact::new(b"session-keys".to_vec()))
            .await
            .unwrap();

        let loaded = store.load(&tenant).await.unwrap().unwrap();
        assert_eq!(loaded.as_bytes(), b"session-keys");
        assert!(dir.path().join("auth").join("6").join("creds.bin").exists());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_artifact() {
        let dir = tempdir().unwrap();
        let store = FileAuthStore::new(dir.path());
        let tenant = TenantId::new("6");

        store.save(&tenant, &AuthArtifact::new(b"old".to_vec())).await.unwrap();
        store.save(&tenant, &AuthArtifact::new(b"new".to_vec())).await.unwrap();

        let loaded = store.load(&tenant).await.unwrap().unwrap();
        assert_eq!(loaded.as_bytes(), b"new");
    }

    #[tokio::test]
    async fn test_delete_removes_tenant_directory() {
        let dir = tempdir().unwrap();
        let store = FileAuthStore::new(dir.path());
        let tenant = TenantId::new("6");

        store.save(&tenant, &AuthArtifact::new(b"keys".to_vec())).await.unwrap();
        store.delete(&tenant).await.unwrap();

        assert!(!store.tenant_dir(&tenant).exists());
        assert!(store.load(&tenant).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = tempdir().unwrap();
        let store = FileAuthStore::new(dir.path());
        store.delete(&TenantId::new("never-paired")).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = FileAuthStore::new(dir.path());
        let tenant = TenantId::new("6");
        std::fs::create_dir_all(store.tenant_dir(&tenant)).unwrap();
        std::fs::write(store.creds_path(&tenant), b"").unwrap();

        assert!(matches!(
            store.load(&tenant).await,
            Err(AuthStoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_tenant_dir_cannot_escape_root() {
        let store = FileAuthStore::new(Path::new("/data"));
        assert_eq!(store.tenant_dir(&TenantId::new("6")), PathBuf::from("/data/auth/6"));
        assert_eq!(
            store.tenant_dir(&TenantId::new("../etc")),
            PathBuf::from("/data/auth/%2E%2E%2Fetc")
        );
        assert_eq!(store.tenant_dir(&TenantId::new("..")), PathBuf::from("/data/auth/%2E%2E"));
        assert_eq!(store.tenant_dir(&TenantId::new("")), PathBuf::from("/data/auth/%"));
    }

    #[test]
    fn test_lookalike_tenants_get_distinct_directories() {
        let store = FileAuthStore::new(Path::new("/data"));
        let ids = ["a_b", "a/b", "a b", "a:b", "a.b", "a%2Eb", "a%2Fb"];
        let dirs: std::collections::HashSet<PathBuf> = ids
            .iter()
            .map(|id| store.tenant_dir(&TenantId::new(*id)))
            .collect();
        assert_eq!(dirs.len(), ids.len());
    }

    #[tokio::test]
    async fn test_delete_leaves_lookalike_tenant_untouched() {
        let dir = tempdir().unwrap();
        let store = FileAuthStore::new(dir.path());
        let kept = TenantId::new("a_b");
        let purged = TenantId::new("a/b");

        store.save(&kept, &AuthArtifact::new(b"kept".to_vec())).await.unwrap();
        store.save(&purged, &AuthArtifact::new(b"purged".to_vec())).await.unwrap();
        store.delete(&purged).await.unwrap();

        let loaded = store.load(&kept).await.unwrap().unwrap();
        assert_eq!(loaded.as_bytes(), b"kept");
        assert!(store.load(&purged).await.unwrap().is_none());
    }
}
