use dog_core::{DogError, TenantId};
use thiserror::Error;

use crate::types::{MigrationHandle, Tier};

/// Result type for gate, routing and migration operations
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Errors surfaced by the tenancy gate
#[derive(Error, Debug, Clone)]
pub enum TenancyError {
    /// No tenant could be resolved from trusted session state
    #[error("Missing tenant context: {reason}")]
    MissingTenantContext { reason: String },

    /// Caller-supplied tenant predicate or field conflicts with the resolved tenant
    #[error("Tenant mismatch: resolved {resolved}, operation referenced {attempted}")]
    TenantMismatch { resolved: TenantId, attempted: String },

    /// Registry or physical target unreachable after bounded retries
    #[error("Routing unavailable for tenant {tenant_id}: {reason}")]
    RoutingUnavailable { tenant_id: TenantId, reason: String },

    #[error("Migration {handle} aborted: {reason}")]
    MigrationAborted { handle: MigrationHandle, reason: String },

    #[error("Migration {handle} failed after registry swap: {reason}")]
    MigrationCutoverFailed { handle: MigrationHandle, reason: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Record already exists: {id}")]
    DuplicateRecord { id: String },

    #[error("Migration not found: {0}")]
    MigrationNotFound(MigrationHandle),

    #[error("Migration {handle} already in progress for tenant {tenant_id}")]
    MigrationInProgress {
        tenant_id: TenantId,
        handle: MigrationHandle,
    },

    #[error("Migrations halted for tenant {tenant_id}: {reason}")]
    MigrationHalted { tenant_id: TenantId, reason: String },

    #[error("Tenant {tenant_id} is already on tier {tier}")]
    AlreadyOnTier { tenant_id: TenantId, tier: Tier },

    /// Transient registry failure (retried by the router)
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Transient store failure (retried by the gate)
    #[error("Target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TenancyError {
    pub fn missing_context(reason: impl Into<String>) -> Self {
        Self::MissingTenantContext {
            reason: reason.into(),
        }
    }

    pub fn mismatch(resolved: &TenantId, attempted: impl Into<String>) -> Self {
        Self::TenantMismatch {
            resolved: resolved.clone(),
            attempted: attempted.into(),
        }
    }

    pub fn routing_unavailable(tenant_id: &TenantId, reason: impl Into<String>) -> Self {
        Self::RoutingUnavailable {
            tenant_id: tenant_id.clone(),
            reason: reason.into(),
        }
    }

    /// Transient failures may be retried with backoff. Tenant-safety
    /// violations never are.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RoutingUnavailable { .. } | Self::RegistryUnavailable(_) | Self::TargetUnavailable(_)
        )
    }

    /// Whether this error must be logged as a potential security event.
    pub fn is_security_event(&self) -> bool {
        matches!(self, Self::TenantMismatch { .. })
    }

    /// Map onto the shared transport-level error.
    pub fn to_dog_error(&self) -> DogError {
        let message = self.to_string();
        match self {
            Self::MissingTenantContext { .. } => DogError::not_authenticated(message),
            Self::TenantMismatch { .. } => DogError::forbidden(message),
            Self::RoutingUnavailable { .. }
            | Self::RegistryUnavailable(_)
            | Self::TargetUnavailable(_) => DogError::unavailable(message),
            Self::MigrationAborted { .. }
            | Self::MigrationInProgress { .. }
            | Self::MigrationHalted { .. }
            | Self::AlreadyOnTier { .. }
            | Self::DuplicateRecord { .. } => DogError::conflict(message),
            Self::InvalidOperation(_) => DogError::bad_request(message),
            Self::MigrationNotFound(_) => DogError::not_found(message),
            Self::MigrationCutoverFailed { .. } | Self::Store(_) | Self::Internal(_) => {
                DogError::general_error(message)
            }
        }
        .with_source(self.clone())
    }
}

impl From<TenancyError> for DogError {
    fn from(err: TenancyError) -> Self {
        err.to_dog_error()
    }
}
