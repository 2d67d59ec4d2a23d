use chrono::{DateTime, Utc};
use dog_core::TenantId;
use serde::{Deserialize, Serialize};

use crate::types::{MigrationHandle, PhysicalTarget, Tier};

/// Phase of a tenant migration.
///
/// `Idle → Provisioning → Backfilling → Cutover → Idle`. Any phase before
/// the registry swap may also fall back to `Idle` on abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Idle,
    Provisioning,
    Backfilling,
    Cutover,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Provisioning => "provisioning",
            Self::Backfilling => "backfilling",
            Self::Cutover => "cutover",
        }
    }

    /// Legal edges of the state machine.
    pub fn can_transition_to(&self, next: MigrationState) -> bool {
        use MigrationState::*;
        matches!(
            (self, next),
            (Idle, Provisioning)
                | (Provisioning, Backfilling)
                | (Backfilling, Cutover)
                | (Cutover, Idle)
                | (Provisioning, Idle)
                | (Backfilling, Idle)
        )
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a migration ended, if it has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MigrationOutcome {
    Pending,
    Completed,
    /// Rolled back before the swap; the tenant stayed on its old target.
    Aborted { reason: String },
    /// Failed after the swap; the tenant is halted until repaired.
    CutoverFailed { reason: String },
}

/// Operator-facing view of one migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub handle: MigrationHandle,
    pub tenant_id: TenantId,
    pub from_tier: Tier,
    pub from_target: PhysicalTarget,
    pub to_tier: Tier,
    /// Known once provisioning succeeded
    pub to_target: Option<PhysicalTarget>,
    pub state: MigrationState,
    pub outcome: MigrationOutcome,
    pub records_copied: usize,
    pub writes_replayed: usize,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MigrationStatus {
    pub(crate) fn start(
        handle: MigrationHandle,
        tenant_id: TenantId,
        from_tier: Tier,
        from_target: PhysicalTarget,
        to_tier: Tier,
    ) -> Self {
        let now = Utc::now();
        Self {
            handle,
            tenant_id,
            from_tier,
            from_target,
            to_tier,
            to_target: None,
            state: MigrationState::Provisioning,
            outcome: MigrationOutcome::Pending,
            records_copied: 0,
            writes_replayed: 0,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self.outcome, MigrationOutcome::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MigrationState::*;

    #[test]
    fn forward_path_is_legal() {
        assert!(Idle.can_transition_to(Provisioning));
        assert!(Provisioning.can_transition_to(Backfilling));
        assert!(Backfilling.can_transition_to(Cutover));
        assert!(Cutover.can_transition_to(Idle));
    }

    #[test]
    fn no_skipping_or_rewinding() {
        assert!(!Idle.can_transition_to(Cutover));
        assert!(!Provisioning.can_transition_to(Cutover));
        assert!(!Cutover.can_transition_to(Backfilling));
        assert!(!Backfilling.can_transition_to(Provisioning));
        assert!(!Idle.can_transition_to(Idle));
    }

    #[test]
    fn aborts_before_cutover_return_to_idle() {
        assert!(Provisioning.can_transition_to(Idle));
        assert!(Backfilling.can_transition_to(Idle));
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Backfilling).unwrap(), "\"backfilling\"");
        let outcome = MigrationOutcome::Aborted {
            reason: "boom".into(),
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"result": "aborted", "reason": "boom"})
        );
    }
}
