//! Core multi-tenant types for DogRS.

use std::fmt;

/// An opaque tenant identifier.
///
/// Assigned once at onboarding and never changed afterwards. Every stored
/// record carries it in its tenant field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank ids never identify a tenant.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Context carried with every gated operation once the tenant is resolved.
///
/// Built from trusted session state only, so services and stores can rely
/// on `tenant_id` without re-checking where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TenantContext {
    pub tenant_id: TenantId,
    /// Correlates log lines and events for one inbound request.
    pub request_id: Option<String>,
}

impl TenantContext {
    /// Convenience constructor from a string.
    pub fn new<S: Into<String>>(tenant: S) -> Self {
        Self {
            tenant_id: TenantId(tenant.into()),
            request_id: None,
        }
    }

    pub fn with_request_id<S: Into<String>>(mut self, request_id: S) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<TenantId> for TenantContext {
    fn from(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            request_id: None,
        }
    }
}
