use chrono::{DateTime, Utc};
use dog_core::TenantId;
use serde::{Deserialize, Serialize};

use super::{MigrationHandle, OpKind, PhysicalTarget, Tier};
use crate::migration::MigrationState;

/// Structured event protocol for operators and audit sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GateEvent {
    /// Unknown tenant was registered on its first operation
    TierAssigned {
        tenant_id: TenantId,
        tier: Tier,
        target: PhysicalTarget,
        at: DateTime<Utc>,
    },

    /// Operation tried to reach another tenant's data (security event)
    TenantMismatch {
        tenant_id: TenantId,
        /// Authenticated principal behind the request, when the session has one.
        principal: Option<String>,
        attempted: String,
        operation: OpKind,
        at: DateTime<Utc>,
    },

    MigrationStateChanged {
        handle: MigrationHandle,
        tenant_id: TenantId,
        from: MigrationState,
        to: MigrationState,
        at: DateTime<Utc>,
    },

    MigrationCompleted {
        handle: MigrationHandle,
        tenant_id: TenantId,
        tier: Tier,
        target: PhysicalTarget,
        at: DateTime<Utc>,
    },

    /// Recoverable; tenant is still served from its old target
    MigrationAborted {
        handle: MigrationHandle,
        tenant_id: TenantId,
        reason: String,
        at: DateTime<Utc>,
    },

    /// Fatal; needs manual registry repair
    CutoverFailed {
        handle: MigrationHandle,
        tenant_id: TenantId,
        reason: String,
        at: DateTime<Utc>,
    },

    /// Retired target archived after its retention window
    TargetArchived {
        tenant_id: TenantId,
        target: PhysicalTarget,
        records: usize,
        at: DateTime<Utc>,
    },
}

impl GateEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::TierAssigned { .. } => "tier_assigned",
            Self::TenantMismatch { .. } => "tenant_mismatch",
            Self::MigrationStateChanged { .. } => "migration_state_changed",
            Self::MigrationCompleted { .. } => "migration_completed",
            Self::MigrationAborted { .. } => "migration_aborted",
            Self::CutoverFailed { .. } => "cutover_failed",
            Self::TargetArchived { .. } => "target_archived",
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        match self {
            Self::TierAssigned { tenant_id, .. } => tenant_id,
            Self::TenantMismatch { tenant_id, .. } => tenant_id,
            Self::MigrationStateChanged { tenant_id, .. } => tenant_id,
            Self::MigrationCompleted { tenant_id, .. } => tenant_id,
            Self::MigrationAborted { tenant_id, .. } => tenant_id,
            Self::CutoverFailed { tenant_id, .. } => tenant_id,
            Self::TargetArchived { tenant_id, .. } => tenant_id,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::TierAssigned { at, .. } => at,
            Self::TenantMismatch { at, .. } => at,
            Self::MigrationStateChanged { at, .. } => at,
            Self::MigrationCompleted { at, .. } => at,
            Self::MigrationAborted { at, .. } => at,
            Self::CutoverFailed { at, .. } => at,
            Self::TargetArchived { at, .. } => at,
        }
    }
}
