//! Tenant and sender identifiers.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Unique identifier for a tenant (one chat-network connection each).
///
/// Opaque string key. Surrounding whitespace is stripped on construction so
/// `" 6 "` and `"6"` address the same tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id, trimming surrounding whitespace.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self::new(s);
        if id.is_empty() {
            return Err("tenant id must not be empty".to_string());
        }
        Ok(id)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

/// Identifier of the remote party that sent an inbound message.
///
/// Each sender gets its own aggregation window inside a tenant's buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SenderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Parse a comma-separated tenant list.
///
/// Entries are trimmed, empty entries are dropped, and duplicates keep only
/// their first occurrence.
pub fn parse_tenant_list(raw: &str) -> Vec<TenantId> {
    let mut tenants: Vec<TenantId> = Vec::new();
    for entry in raw.split(',') {
        let id = TenantId::new(entry);
        if !id.is_empty() && !tenants.contains(&id) {
            tenants.push(id);
        }
    }
    tenants
}
