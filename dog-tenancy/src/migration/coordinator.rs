use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dog_core::TenantId;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use super::{
    JournalEntry, MigrationOutcome, MigrationState, MigrationStatus, RetentionReaper,
    WriteBarrier, WriteJournal,
};
use crate::driver::{TargetPool, TargetProvisioner};
use crate::events::EventBus;
use crate::guard::QueryGuard;
use crate::registry::TierRegistry;
use crate::router::ShardRouter;
use crate::types::{GateEvent, MigrationHandle, PhysicalTarget, TenantTierRecord, Tier};
use crate::{TenancyError, TenancyResult};

enum CutoverFailure {
    /// Registry still names the old target; safe to roll back.
    BeforeSwap(TenancyError),
    /// Registry state is unknown or already changed.
    AfterSwap(String),
}

/// Runs tenant migrations between tiers as explicit state machines.
///
/// Every migration gets a [`MigrationHandle`] whose [`MigrationStatus`] can
/// be queried at any time. Steps for one handle are serialized; different
/// tenants migrate independently.
pub struct MigrationCoordinator {
    router: Arc<ShardRouter>,
    pool: Arc<TargetPool>,
    provisioner: Arc<dyn TargetProvisioner>,
    reaper: Arc<RetentionReaper>,
    guard: QueryGuard,
    events: EventBus,
    hold_timeout: Duration,
    barrier: WriteBarrier,
    journal: WriteJournal,
    migrations: DashMap<MigrationHandle, MigrationStatus>,
    steps: DashMap<MigrationHandle, Arc<Mutex<()>>>,
    active: DashMap<TenantId, MigrationHandle>,
    halted: DashMap<TenantId, String>,
}

impl MigrationCoordinator {
    pub fn new(
        router: Arc<ShardRouter>,
        pool: Arc<TargetPool>,
        provisioner: Arc<dyn TargetProvisioner>,
        reaper: Arc<RetentionReaper>,
        guard: QueryGuard,
        events: EventBus,
        hold_timeout: Duration,
    ) -> Self {
        Self {
            router,
            pool,
            provisioner,
            reaper,
            guard,
            events,
            hold_timeout,
            barrier: WriteBarrier::new(),
            journal: WriteJournal::new(),
            migrations: DashMap::new(),
            steps: DashMap::new(),
            active: DashMap::new(),
            halted: DashMap::new(),
        }
    }

    pub(crate) fn barrier(&self) -> &WriteBarrier {
        &self.barrier
    }

    pub(crate) fn journal(&self) -> &WriteJournal {
        &self.journal
    }

    pub fn hold_timeout(&self) -> Duration {
        self.hold_timeout
    }

    /// Start a migration and drive it to completion in the background.
    pub async fn trigger_migration(
        self: &Arc<Self>,
        tenant: &TenantId,
        to_tier: Tier,
    ) -> TenancyResult<MigrationHandle> {
        let handle = self.begin(tenant, to_tier).await?;

        let coordinator = Arc::clone(self);
        let task_handle = handle.clone();
        tokio::spawn(async move {
            if let Err(err) = coordinator.drive(&task_handle).await {
                warn!(handle = %task_handle, error = %err, "migration did not complete");
            }
        });

        Ok(handle)
    }

    /// Validate and register a migration without running any step.
    #[instrument(skip(self), fields(tenant_id = %tenant, to_tier = %to_tier))]
    pub async fn begin(&self, tenant: &TenantId, to_tier: Tier) -> TenancyResult<MigrationHandle> {
        if tenant.is_blank() {
            return Err(TenancyError::missing_context("cannot migrate a blank tenant id"));
        }
        if let Some(reason) = self.halted.get(tenant).map(|r| r.value().clone()) {
            return Err(TenancyError::MigrationHalted {
                tenant_id: tenant.clone(),
                reason,
            });
        }

        let route = self.router.route(tenant).await?;
        if route.tier == to_tier {
            return Err(TenancyError::AlreadyOnTier {
                tenant_id: tenant.clone(),
                tier: to_tier,
            });
        }

        let handle = MigrationHandle::new();
        match self.active.entry(tenant.clone()) {
            Entry::Occupied(running) => {
                return Err(TenancyError::MigrationInProgress {
                    tenant_id: tenant.clone(),
                    handle: running.get().clone(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
            }
        }

        let status = MigrationStatus::start(
            handle.clone(),
            tenant.clone(),
            route.tier,
            route.target.clone(),
            to_tier,
        );
        self.steps.insert(handle.clone(), Arc::default());
        self.migrations.insert(handle.clone(), status);

        info!(%handle, from_tier = %route.tier, from_target = %route.target, "migration triggered");
        self.events.emit(GateEvent::MigrationStateChanged {
            handle: handle.clone(),
            tenant_id: tenant.clone(),
            from: MigrationState::Idle,
            to: MigrationState::Provisioning,
            at: Utc::now(),
        });
        Ok(handle)
    }

    /// Run steps until the migration has finished one way or the other.
    pub async fn drive(&self, handle: &MigrationHandle) -> TenancyResult<MigrationStatus> {
        loop {
            let status = self.advance(handle).await?;
            if status.is_finished() {
                return Ok(status);
            }
        }
    }

    /// Execute the next step of a migration. A finished migration is
    /// returned unchanged.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn advance(&self, handle: &MigrationHandle) -> TenancyResult<MigrationStatus> {
        // Finished migrations no longer have a step lock.
        let Some(step) = self.steps.get(handle).map(|s| s.value().clone()) else {
            return self.migration_status(handle);
        };
        let _step = step.lock().await;

        let status = self.migration_status(handle)?;
        if status.is_finished() {
            return Ok(status);
        }

        let tenant = status.tenant_id.clone();
        let stepped = match status.state {
            MigrationState::Provisioning => self.provision(status).await,
            MigrationState::Backfilling => self.backfill(status).await,
            MigrationState::Cutover => self.cutover(status).await,
            MigrationState::Idle => Err(TenancyError::Internal(format!(
                "migration {handle} is idle but not finished"
            ))),
        };

        if self.migration_status(handle).is_ok_and(|s| s.is_finished()) {
            self.steps.remove(handle);
            self.barrier.release_idle(&tenant);
        }
        stepped
    }

    pub fn migration_status(&self, handle: &MigrationHandle) -> TenancyResult<MigrationStatus> {
        self.migrations
            .get(handle)
            .map(|s| s.value().clone())
            .ok_or_else(|| TenancyError::MigrationNotFound(handle.clone()))
    }

    /// Every migration ever started for `tenant`, oldest first.
    pub fn migrations_for(&self, tenant: &TenantId) -> Vec<MigrationStatus> {
        let mut all: Vec<_> = self
            .migrations
            .iter()
            .filter(|s| s.tenant_id == *tenant)
            .map(|s| s.value().clone())
            .collect();
        all.sort_by_key(|s| s.started_at);
        all
    }

    pub fn active_migration(&self, tenant: &TenantId) -> Option<MigrationHandle> {
        self.active.get(tenant).map(|h| h.value().clone())
    }

    pub fn is_halted(&self, tenant: &TenantId) -> bool {
        self.halted.contains_key(tenant)
    }

    /// Re-enable migrations for a tenant after its registry record was
    /// repaired by hand. Returns whether the tenant was halted.
    pub fn clear_halt(&self, tenant: &TenantId) -> bool {
        let cleared = self.halted.remove(tenant).is_some();
        if cleared {
            info!(tenant_id = %tenant, "migration halt cleared");
        }
        cleared
    }

    async fn provision(&self, status: MigrationStatus) -> TenancyResult<MigrationStatus> {
        let tenant = &status.tenant_id;

        let target = match self.provisioner.provision(tenant, status.to_tier).await {
            Ok(target) => target,
            Err(err) => return Err(self.abort(&status, err).await),
        };
        let status = self.update(&status.handle, |s| s.to_target = Some(target.clone()))?;

        if target == status.from_target {
            let err = TenancyError::InvalidOperation(format!(
                "{} tier resolves to the current target {target}",
                status.to_tier
            ));
            return Err(self.abort(&status, err).await);
        }
        if let Err(err) = self.pool.driver(&target) {
            return Err(self.abort(&status, err).await);
        }
        // The destination may be a target this tenant left earlier.
        self.reaper.claim(tenant, &target).await;

        // No write may be in flight while the journal is switched on.
        match self.barrier.hold(tenant, self.hold_timeout).await {
            Ok(hold) => {
                self.journal.activate(tenant);
                drop(hold);
            }
            Err(err) => return Err(self.abort(&status, err).await),
        }

        self.transition(&status.handle, MigrationState::Backfilling, |_| {})
    }

    async fn backfill(&self, status: MigrationStatus) -> TenancyResult<MigrationStatus> {
        let Some(to_target) = status.to_target.clone() else {
            let err = TenancyError::Internal("backfill without a provisioned target".into());
            return Err(self.abort(&status, err).await);
        };

        match self
            .copy_records(&status.tenant_id, &status.from_target, &to_target)
            .await
        {
            Ok(copied) => {
                info!(tenant_id = %status.tenant_id, copied, "backfill complete");
                self.transition(&status.handle, MigrationState::Cutover, |s| {
                    s.records_copied = copied
                })
            }
            Err(err) => Err(self.abort(&status, err).await),
        }
    }

    async fn cutover(&self, status: MigrationStatus) -> TenancyResult<MigrationStatus> {
        let tenant = &status.tenant_id;
        let Some(to_target) = status.to_target.clone() else {
            let err = TenancyError::Internal("cutover without a provisioned target".into());
            return Err(self.abort(&status, err).await);
        };

        let hold = match self.barrier.hold(tenant, self.hold_timeout).await {
            Ok(hold) => hold,
            Err(err) => return Err(self.abort(&status, err).await),
        };
        let swapped = self.swap(&status, &to_target).await;
        drop(hold);

        match swapped {
            Ok((record, replayed)) => {
                self.reaper.retire(tenant, status.from_target.clone());
                self.reaper.release_claim(tenant);
                self.active.remove_if(tenant, |_, h| *h == status.handle);

                let done = self.transition(&status.handle, MigrationState::Idle, |s| {
                    s.writes_replayed = replayed;
                    s.outcome = MigrationOutcome::Completed;
                })?;
                info!(
                    tenant_id = %tenant,
                    handle = %status.handle,
                    tier = %record.tier,
                    target = %record.target,
                    replayed,
                    "migration completed"
                );
                self.events.emit(GateEvent::MigrationCompleted {
                    handle: status.handle.clone(),
                    tenant_id: tenant.clone(),
                    tier: record.tier,
                    target: record.target,
                    at: Utc::now(),
                });
                Ok(done)
            }
            Err(CutoverFailure::BeforeSwap(err)) => Err(self.abort(&status, err).await),
            Err(CutoverFailure::AfterSwap(reason)) => Err(self.fail_cutover(&status, reason)),
        }
    }

    /// Replay the journal onto the new target, then flip the registry
    /// record and confirm the flip. Runs with the tenant's writes held.
    async fn swap(
        &self,
        status: &MigrationStatus,
        to_target: &PhysicalTarget,
    ) -> Result<(TenantTierRecord, usize), CutoverFailure> {
        let tenant = &status.tenant_id;
        let registry = self.router.registry();

        let entries = self.journal.take(tenant).await;
        let replayed = self
            .replay(tenant, to_target, &entries)
            .await
            .map_err(CutoverFailure::BeforeSwap)?;

        let current = match registry.get(tenant).await.map_err(CutoverFailure::BeforeSwap)? {
            Some(record) if record.target == status.from_target => record,
            Some(record) => {
                return Err(CutoverFailure::BeforeSwap(TenancyError::Internal(format!(
                    "tier record moved to {} during migration",
                    record.target
                ))))
            }
            None => {
                return Err(CutoverFailure::BeforeSwap(TenancyError::Internal(
                    "tier record disappeared during migration".into(),
                )))
            }
        };

        let next = current.migrated_to(status.to_tier, to_target.clone());
        let swap_error = match registry
            .compare_and_swap(tenant, Some(&current), next.clone())
            .await
        {
            Ok(true) => None,
            Ok(false) => {
                return Err(CutoverFailure::BeforeSwap(TenancyError::Internal(
                    "tier record changed concurrently, swap refused".into(),
                )))
            }
            Err(err) => Some(err),
        };

        match (registry.get(tenant).await, swap_error) {
            (Ok(Some(found)), _) if found == next => Ok((next, replayed)),
            (Ok(Some(found)), Some(err)) if found == current => {
                Err(CutoverFailure::BeforeSwap(err))
            }
            (Ok(found), _) => Err(CutoverFailure::AfterSwap(format!(
                "registry does not hold the swapped record (found {:?})",
                found.map(|r| r.target)
            ))),
            (Err(err), _) => Err(CutoverFailure::AfterSwap(format!(
                "could not verify registry swap: {err}"
            ))),
        }
    }

    async fn copy_records(
        &self,
        tenant: &TenantId,
        from: &PhysicalTarget,
        to: &PhysicalTarget,
    ) -> TenancyResult<usize> {
        let source = self.pool.driver(from)?;
        let dest = self.pool.driver(to)?;
        let everything = self.guard.tenant_filter(tenant);

        // Drop leftovers from an earlier stay on this target.
        dest.delete(&everything).await?;

        let records = source.find(&everything).await?;
        let copied = records.len();
        for doc in records {
            dest.upsert(self.guard.scope_document(doc, tenant)?).await?;
        }
        Ok(copied)
    }

    async fn replay(
        &self,
        tenant: &TenantId,
        target: &PhysicalTarget,
        entries: &[JournalEntry],
    ) -> TenancyResult<usize> {
        let dest = self.pool.driver(target)?;
        for entry in entries {
            match entry {
                JournalEntry::Put(doc) => {
                    dest.upsert(self.guard.scope_document(doc.clone(), tenant)?)
                        .await?
                }
                JournalEntry::Remove(id) => {
                    dest.delete(&self.guard.record_filter(tenant, id)).await?;
                }
            }
        }
        Ok(entries.len())
    }

    /// Roll back to the old target and report `MigrationAborted`.
    async fn abort(&self, status: &MigrationStatus, cause: TenancyError) -> TenancyError {
        let tenant = &status.tenant_id;
        let reason = cause.to_string();
        self.journal.discard(tenant);

        let latest = self.migration_status(&status.handle).ok();
        let to_target = latest.and_then(|s| s.to_target).or(status.to_target.clone());
        if let Some(target) = to_target.filter(|t| *t != status.from_target) {
            if let Ok(driver) = self.pool.driver(&target) {
                if let Err(err) = driver.delete(&self.guard.tenant_filter(tenant)).await {
                    warn!(tenant_id = %tenant, %target, error = %err, "could not clear partial copy");
                }
            }
            if let Err(err) = self.provisioner.release(tenant, &target).await {
                warn!(tenant_id = %tenant, %target, error = %err, "could not release target");
            }
        }
        self.reaper.release_claim(tenant);

        if let Err(err) = self.transition(&status.handle, MigrationState::Idle, |s| {
            s.outcome = MigrationOutcome::Aborted {
                reason: reason.clone(),
            }
        }) {
            error!(handle = %status.handle, error = %err, "could not record aborted migration");
        }
        self.active.remove_if(tenant, |_, h| *h == status.handle);

        warn!(
            tenant_id = %tenant,
            handle = %status.handle,
            state = %status.state,
            %reason,
            "migration aborted, tenant stays on {}",
            status.from_target
        );
        self.events.emit(GateEvent::MigrationAborted {
            handle: status.handle.clone(),
            tenant_id: tenant.clone(),
            reason: reason.clone(),
            at: Utc::now(),
        });

        TenancyError::MigrationAborted {
            handle: status.handle.clone(),
            reason,
        }
    }

    /// Registry state after the swap is not what we wrote. Nothing is
    /// rolled back; the tenant is halted until an operator repairs it.
    fn fail_cutover(&self, status: &MigrationStatus, reason: String) -> TenancyError {
        let tenant = &status.tenant_id;
        self.halted.insert(tenant.clone(), reason.clone());
        self.reaper.release_claim(tenant);
        self.active.remove_if(tenant, |_, h| *h == status.handle);

        if let Err(err) = self.update(&status.handle, |s| {
            s.outcome = MigrationOutcome::CutoverFailed {
                reason: reason.clone(),
            }
        }) {
            error!(handle = %status.handle, error = %err, "could not record failed cutover");
        }

        error!(
            tenant_id = %tenant,
            handle = %status.handle,
            %reason,
            "cutover failed after registry swap, tenant halted"
        );
        self.events.emit(GateEvent::CutoverFailed {
            handle: status.handle.clone(),
            tenant_id: tenant.clone(),
            reason: reason.clone(),
            at: Utc::now(),
        });

        TenancyError::MigrationCutoverFailed {
            handle: status.handle.clone(),
            reason,
        }
    }

    fn update<F>(&self, handle: &MigrationHandle, edit: F) -> TenancyResult<MigrationStatus>
    where
        F: FnOnce(&mut MigrationStatus),
    {
        let mut status = self
            .migrations
            .get_mut(handle)
            .ok_or_else(|| TenancyError::MigrationNotFound(handle.clone()))?;
        edit(&mut status);
        status.updated_at = Utc::now();
        Ok(status.clone())
    }

    fn transition<F>(
        &self,
        handle: &MigrationHandle,
        to: MigrationState,
        edit: F,
    ) -> TenancyResult<MigrationStatus>
    where
        F: FnOnce(&mut MigrationStatus),
    {
        let (from, snapshot) = {
            let mut status = self
                .migrations
                .get_mut(handle)
                .ok_or_else(|| TenancyError::MigrationNotFound(handle.clone()))?;
            let from = status.state;
            if !from.can_transition_to(to) {
                return Err(TenancyError::Internal(format!(
                    "illegal migration transition {from} -> {to}"
                )));
            }
            status.state = to;
            edit(&mut status);
            status.updated_at = Utc::now();
            (from, status.clone())
        };

        info!(handle = %handle, tenant_id = %snapshot.tenant_id, %from, %to, "migration state changed");
        self.events.emit(GateEvent::MigrationStateChanged {
            handle: handle.clone(),
            tenant_id: snapshot.tenant_id.clone(),
            from,
            to,
            at: Utc::now(),
        });
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MemoryProvisioner, MemoryStore, StoreDriver};
    use crate::registry::MemoryTierRegistry;
    use crate::retry::RetryPolicy;
    use serde_json::json;

    struct Fixture {
        registry: Arc<MemoryTierRegistry>,
        pool: Arc<TargetPool>,
        shared: Arc<MemoryStore>,
        provisioner: Arc<MemoryProvisioner>,
        reaper: Arc<RetentionReaper>,
        coordinator: Arc<MigrationCoordinator>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(MemoryTierRegistry::new());
        let pool = Arc::new(TargetPool::new());
        let shared_target = PhysicalTarget::shared_pool("main");
        let shared = Arc::new(MemoryStore::new(shared_target.clone()));
        pool.register(shared_target.clone(), shared.clone());

        let events = EventBus::default();
        let guard = QueryGuard::default();
        let router = Arc::new(ShardRouter::new(
            registry.clone(),
            shared_target.clone(),
            RetryPolicy::none(),
            events.clone(),
        ));
        let provisioner = Arc::new(MemoryProvisioner::new(pool.clone(), shared_target, 4));
        let reaper = Arc::new(RetentionReaper::new(
            registry.clone(),
            pool.clone(),
            guard.clone(),
            events.clone(),
            Duration::from_secs(3600),
        ));
        let coordinator = Arc::new(MigrationCoordinator::new(
            router,
            pool.clone(),
            provisioner.clone(),
            reaper.clone(),
            guard,
            events,
            Duration::from_millis(200),
        ));

        Fixture {
            registry,
            pool,
            shared,
            provisioner,
            reaper,
            coordinator,
        }
    }

    async fn seed(store: &MemoryStore, tenant: &str, ids: &[&str]) {
        let guard = QueryGuard::default();
        for id in ids {
            let doc = json!({"id": id, "tenantId": tenant}).as_object().cloned().unwrap();
            store
                .upsert(guard.scope_document(doc, &TenantId::new(tenant)).unwrap())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn steps_through_every_state() {
        let f = fixture();
        let t1 = TenantId::new("t1");
        seed(&f.shared, "t1", &["r1", "r2"]).await;
        seed(&f.shared, "t2", &["x1"]).await;

        let handle = f.coordinator.begin(&t1, Tier::Dedicated).await.unwrap();
        assert_eq!(
            f.coordinator.migration_status(&handle).unwrap().state,
            MigrationState::Provisioning
        );

        let status = f.coordinator.advance(&handle).await.unwrap();
        assert_eq!(status.state, MigrationState::Backfilling);
        assert_eq!(status.to_target, Some(PhysicalTarget::cluster(&t1)));
        assert!(f.coordinator.journal().is_active(&t1));

        let status = f.coordinator.advance(&handle).await.unwrap();
        assert_eq!(status.state, MigrationState::Cutover);
        assert_eq!(status.records_copied, 2);

        // Registry untouched until cutover.
        let record = f.registry.get(&t1).await.unwrap().unwrap();
        assert_eq!(record.tier, Tier::Shared);

        let status = f.coordinator.advance(&handle).await.unwrap();
        assert_eq!(status.state, MigrationState::Idle);
        assert_eq!(status.outcome, MigrationOutcome::Completed);

        let record = f.registry.get(&t1).await.unwrap().unwrap();
        assert_eq!(record.tier, Tier::Dedicated);
        assert_eq!(record.version, 2);

        let cluster = f.pool.driver(&PhysicalTarget::cluster(&t1)).unwrap();
        let copied = cluster
            .find(&QueryGuard::default().tenant_filter(&t1))
            .await
            .unwrap();
        assert_eq!(copied.len(), 2);

        assert_eq!(f.reaper.pending().len(), 1);
        assert!(f.coordinator.active_migration(&t1).is_none());
        assert!(!f.coordinator.journal().is_active(&t1));
    }

    #[tokio::test]
    async fn advancing_a_finished_migration_is_a_no_op() {
        let f = fixture();
        let t1 = TenantId::new("t1");
        let handle = f.coordinator.begin(&t1, Tier::Sharded).await.unwrap();
        let done = f.coordinator.drive(&handle).await.unwrap();
        assert_eq!(done.outcome, MigrationOutcome::Completed);

        let again = f.coordinator.advance(&handle).await.unwrap();
        assert_eq!(again.updated_at, done.updated_at);

        assert!(f.coordinator.steps.is_empty());
        assert_eq!(f.coordinator.barrier().tracked(), 0);
    }

    #[tokio::test]
    async fn aborted_migrations_drop_their_step_lock() {
        let f = fixture();
        let t1 = TenantId::new("t1");
        f.provisioner.set_failing(true);

        let handle = f.coordinator.begin(&t1, Tier::Dedicated).await.unwrap();
        assert!(f.coordinator.advance(&handle).await.is_err());
        assert!(f.coordinator.steps.is_empty());

        let status = f.coordinator.advance(&handle).await.unwrap();
        assert!(matches!(status.outcome, MigrationOutcome::Aborted { .. }));
    }

    #[tokio::test]
    async fn begin_validates_the_request() {
        let f = fixture();
        let t1 = TenantId::new("t1");

        let same = f.coordinator.begin(&t1, Tier::Shared).await;
        assert!(matches!(same, Err(TenancyError::AlreadyOnTier { .. })));

        let first = f.coordinator.begin(&t1, Tier::Dedicated).await.unwrap();
        let second = f.coordinator.begin(&t1, Tier::Sharded).await;
        assert!(matches!(
            second,
            Err(TenancyError::MigrationInProgress { ref handle, .. }) if *handle == first
        ));

        let unknown = f.coordinator.migration_status(&MigrationHandle::new());
        assert!(matches!(unknown, Err(TenancyError::MigrationNotFound(_))));
    }

    #[tokio::test]
    async fn provisioning_failure_aborts_and_frees_the_tenant() {
        let f = fixture();
        let t1 = TenantId::new("t1");
        f.provisioner.set_failing(true);

        let handle = f.coordinator.begin(&t1, Tier::Dedicated).await.unwrap();
        let err = f.coordinator.advance(&handle).await.unwrap_err();
        assert!(matches!(err, TenancyError::MigrationAborted { .. }));

        let status = f.coordinator.migration_status(&handle).unwrap();
        assert_eq!(status.state, MigrationState::Idle);
        assert!(matches!(status.outcome, MigrationOutcome::Aborted { .. }));
        assert_eq!(f.registry.get(&t1).await.unwrap().unwrap().tier, Tier::Shared);

        f.provisioner.set_failing(false);
        assert!(f.coordinator.begin(&t1, Tier::Dedicated).await.is_ok());
    }

    #[tokio::test]
    async fn backfill_failure_releases_the_new_target() {
        let f = fixture();
        let t1 = TenantId::new("t1");
        seed(&f.shared, "t1", &["r1"]).await;

        let handle = f.coordinator.begin(&t1, Tier::Dedicated).await.unwrap();
        f.coordinator.advance(&handle).await.unwrap();
        assert!(f.pool.contains(&PhysicalTarget::cluster(&t1)));

        f.shared.set_unavailable(true);
        let err = f.coordinator.advance(&handle).await.unwrap_err();
        assert!(matches!(err, TenancyError::MigrationAborted { .. }));

        assert!(!f.pool.contains(&PhysicalTarget::cluster(&t1)));
        assert!(!f.coordinator.journal().is_active(&t1));
        f.shared.set_unavailable(false);
        assert_eq!(f.shared.record_count(&t1), 1);
        assert_eq!(f.registry.get(&t1).await.unwrap().unwrap().tier, Tier::Shared);
    }

    #[tokio::test]
    async fn halted_tenants_cannot_migrate_until_cleared() {
        let f = fixture();
        let t1 = TenantId::new("t1");
        f.coordinator
            .halted
            .insert(t1.clone(), "manual repair pending".into());

        let err = f.coordinator.begin(&t1, Tier::Dedicated).await.unwrap_err();
        assert!(matches!(err, TenancyError::MigrationHalted { .. }));

        assert!(f.coordinator.clear_halt(&t1));
        assert!(!f.coordinator.clear_halt(&t1));
        assert!(f.coordinator.begin(&t1, Tier::Dedicated).await.is_ok());
    }

    #[tokio::test]
    async fn trigger_runs_in_the_background() {
        let f = fixture();
        let t1 = TenantId::new("t1");
        seed(&f.shared, "t1", &["r1"]).await;

        let handle = f
            .coordinator
            .trigger_migration(&t1, Tier::Dedicated)
            .await
            .unwrap();

        let mut status = f.coordinator.migration_status(&handle).unwrap();
        for _ in 0..200 {
            if status.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            status = f.coordinator.migration_status(&handle).unwrap();
        }
        assert_eq!(status.outcome, MigrationOutcome::Completed);
        assert_eq!(f.coordinator.migrations_for(&t1).len(), 1);
    }
}
