use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dog_core::TenantId;
use parking_lot::Mutex;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::driver::TargetPool;
use crate::events::EventBus;
use crate::guard::QueryGuard;
use crate::registry::TierRegistry;
use crate::types::{GateEvent, PhysicalTarget};
use crate::TenancyResult;

/// Old target kept readable after a completed migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetiredTarget {
    pub tenant_id: TenantId,
    pub target: PhysicalTarget,
    pub retire_after: DateTime<Utc>,
}

/// Archives a tenant's records on its old target once the retention
/// window after cutover has passed.
///
/// A target a running migration is copying into is claimed and never
/// archived while the claim lasts.
pub struct RetentionReaper {
    registry: Arc<dyn TierRegistry>,
    pool: Arc<TargetPool>,
    guard: QueryGuard,
    events: EventBus,
    window: Duration,
    retired: Mutex<Vec<RetiredTarget>>,
    inbound: DashMap<TenantId, PhysicalTarget>,
    archiving: tokio::sync::Mutex<()>,
}

impl RetentionReaper {
    pub fn new(
        registry: Arc<dyn TierRegistry>,
        pool: Arc<TargetPool>,
        guard: QueryGuard,
        events: EventBus,
        window: Duration,
    ) -> Self {
        Self {
            registry,
            pool,
            guard,
            events,
            window,
            retired: Mutex::new(Vec::new()),
            inbound: DashMap::new(),
            archiving: tokio::sync::Mutex::new(()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedule `target` for archival once the retention window is over.
    pub fn retire(&self, tenant: &TenantId, target: PhysicalTarget) {
        let retire_after = chrono::Duration::from_std(self.window)
            .ok()
            .and_then(|window| Utc::now().checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        debug!(tenant_id = %tenant, %target, %retire_after, "target retired");
        self.retired.lock().push(RetiredTarget {
            tenant_id: tenant.clone(),
            target,
            retire_after,
        });
    }

    /// Mark `target` as the destination of a migration for `tenant` and drop
    /// any pending archival of it. Waits for an archive already in progress,
    /// so nothing copied after this returns can be archived.
    pub async fn claim(&self, tenant: &TenantId, target: &PhysicalTarget) {
        let _archiving = self.archiving.lock().await;
        self.inbound.insert(tenant.clone(), target.clone());

        let mut retired = self.retired.lock();
        let before = retired.len();
        retired.retain(|r| !(r.tenant_id == *tenant && r.target == *target));
        if retired.len() != before {
            debug!(tenant_id = %tenant, %target, "retired target claimed by migration");
        }
    }

    /// Drop the claim taken by [`claim`](Self::claim).
    pub fn release_claim(&self, tenant: &TenantId) {
        self.inbound.remove(tenant);
    }

    pub fn is_claimed(&self, tenant: &TenantId, target: &PhysicalTarget) -> bool {
        self.inbound
            .get(tenant)
            .is_some_and(|claimed| *claimed == *target)
    }

    /// Targets still waiting for archival.
    pub fn pending(&self) -> Vec<RetiredTarget> {
        self.retired.lock().clone()
    }

    /// Run the reaper loop forever.
    pub async fn start(self: Arc<Self>, every: Duration) {
        let mut ticker = interval(every);
        info!(?every, window = ?self.window, "starting retention reaper");

        loop {
            ticker.tick().await;
            match self.run_tick().await {
                Ok(0) => debug!("no retired targets due"),
                Ok(archived) => info!(archived, "archived retired targets"),
                Err(e) => warn!("error during retention reaping: {}", e),
            }
        }
    }

    /// Archive every retired target whose window has passed. Returns how
    /// many targets were processed.
    pub async fn run_tick(&self) -> TenancyResult<usize> {
        let now = Utc::now();
        let due: Vec<RetiredTarget> = {
            let mut retired = self.retired.lock();
            let (due, waiting): (Vec<_>, Vec<_>) =
                retired.drain(..).partition(|r| r.retire_after <= now);
            *retired = waiting;
            due
        };

        let mut processed = 0;
        for (index, entry) in due.iter().enumerate() {
            if let Err(err) = self.archive(entry).await {
                // Put back what we did not get to.
                self.retired.lock().extend(due[index..].iter().cloned());
                return Err(err);
            }
            processed += 1;
        }
        Ok(processed)
    }

    async fn archive(&self, entry: &RetiredTarget) -> TenancyResult<()> {
        let _archiving = self.archiving.lock().await;
        if self.is_claimed(&entry.tenant_id, &entry.target) {
            debug!(tenant_id = %entry.tenant_id, target = %entry.target, "target claimed by a migration, not archiving");
            return Ok(());
        }

        // A later migration may have moved the tenant back.
        if let Some(record) = self.registry.get(&entry.tenant_id).await? {
            if record.target == entry.target {
                debug!(tenant_id = %entry.tenant_id, target = %entry.target, "target live again, not archiving");
                return Ok(());
            }
        }

        let driver = self.pool.driver(&entry.target)?;
        let records = driver
            .archive(&self.guard.tenant_filter(&entry.tenant_id))
            .await?;

        info!(tenant_id = %entry.tenant_id, target = %entry.target, records, "archived old target");
        self.events.emit(GateEvent::TargetArchived {
            tenant_id: entry.tenant_id.clone(),
            target: entry.target.clone(),
            records,
            at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MemoryStore, StoreDriver};
    use crate::registry::MemoryTierRegistry;
    use crate::types::{TenantTierRecord, Tier};
    use serde_json::json;

    struct Fixture {
        registry: Arc<MemoryTierRegistry>,
        old: Arc<MemoryStore>,
        reaper: RetentionReaper,
    }

    async fn fixture(window: Duration) -> Fixture {
        let registry = Arc::new(MemoryTierRegistry::new());
        let pool = Arc::new(TargetPool::new());
        let guard = QueryGuard::default();
        let t1 = TenantId::new("t1");
        let old_target = PhysicalTarget::shared_pool("main");
        let old = Arc::new(MemoryStore::new(old_target.clone()));
        pool.register(old_target.clone(), old.clone());

        let doc = guard
            .scope_document(
                json!({"id": "r1", "tenantId": "t1"}).as_object().cloned().unwrap(),
                &t1,
            )
            .unwrap();
        old.upsert(doc).await.unwrap();

        registry.insert(TenantTierRecord::onboard(
            t1.clone(),
            Tier::Dedicated,
            PhysicalTarget::cluster(&t1),
        ));

        let reaper = RetentionReaper::new(
            registry.clone(),
            pool,
            guard,
            EventBus::default(),
            window,
        );
        Fixture {
            registry,
            old,
            reaper,
        }
    }

    #[tokio::test]
    async fn nothing_is_archived_inside_the_window() {
        let f = fixture(Duration::from_secs(3600)).await;
        let t1 = TenantId::new("t1");
        f.reaper.retire(&t1, PhysicalTarget::shared_pool("main"));

        assert_eq!(f.reaper.run_tick().await.unwrap(), 0);
        assert_eq!(f.old.record_count(&t1), 1);
        assert_eq!(f.reaper.pending().len(), 1);
    }

    #[tokio::test]
    async fn due_targets_are_archived() {
        let f = fixture(Duration::ZERO).await;
        let t1 = TenantId::new("t1");
        f.reaper.retire(&t1, PhysicalTarget::shared_pool("main"));

        assert_eq!(f.reaper.run_tick().await.unwrap(), 1);
        assert_eq!(f.old.record_count(&t1), 0);
        assert_eq!(f.old.archived_count(&t1), 1);
        assert!(f.reaper.pending().is_empty());
    }

    #[tokio::test]
    async fn target_that_is_live_again_is_left_alone() {
        let f = fixture(Duration::ZERO).await;
        let t1 = TenantId::new("t1");
        f.registry.insert(TenantTierRecord::onboard(
            t1.clone(),
            Tier::Shared,
            PhysicalTarget::shared_pool("main"),
        ));
        f.reaper.retire(&t1, PhysicalTarget::shared_pool("main"));

        f.reaper.run_tick().await.unwrap();
        assert_eq!(f.old.record_count(&t1), 1);
    }

    #[tokio::test]
    async fn claimed_target_is_never_archived() {
        let f = fixture(Duration::ZERO).await;
        let t1 = TenantId::new("t1");
        let shared = PhysicalTarget::shared_pool("main");
        f.reaper.retire(&t1, shared.clone());

        f.reaper.claim(&t1, &shared).await;
        assert!(f.reaper.pending().is_empty());

        // An entry a tick drained before the claim landed.
        f.reaper.retire(&t1, shared.clone());
        f.reaper.run_tick().await.unwrap();
        assert_eq!(f.old.record_count(&t1), 1);
        assert_eq!(f.old.archived_count(&t1), 0);

        f.reaper.release_claim(&t1);
        assert!(!f.reaper.is_claimed(&t1, &shared));
    }

    #[tokio::test]
    async fn failed_archival_is_retried_next_tick() {
        let f = fixture(Duration::ZERO).await;
        let t1 = TenantId::new("t1");
        f.reaper.retire(&t1, PhysicalTarget::shared_pool("main"));

        f.old.set_unavailable(true);
        assert!(f.reaper.run_tick().await.is_err());
        assert_eq!(f.reaper.pending().len(), 1);

        f.old.set_unavailable(false);
        assert_eq!(f.reaper.run_tick().await.unwrap(), 1);
        assert_eq!(f.old.archived_count(&t1), 1);
    }
}
