use std::sync::Arc;
use std::time::Duration;

use dog_core::TenantId;
use tokio::task::JoinHandle;

use crate::config::GateConfig;
use crate::driver::{MemoryProvisioner, MemoryStore, StoreDriver, TargetPool, TargetProvisioner};
use crate::events::{BoxStream, EventBus};
use crate::gate::TenantGate;
use crate::guard::QueryGuard;
use crate::migration::{MigrationCoordinator, MigrationStatus, RetentionReaper};
use crate::registry::{MemoryTierRegistry, TierRegistry};
use crate::resolver::{ClaimResolver, TenantResolver};
use crate::router::ShardRouter;
use crate::types::{GateEvent, MigrationHandle, Tier};
use crate::TenancyResult;

/// Wires the gate, router, migration coordinator and retention reaper
/// around one registry and one target pool.
pub struct TenancyEngine {
    config: GateConfig,
    registry: Arc<dyn TierRegistry>,
    pool: Arc<TargetPool>,
    router: Arc<ShardRouter>,
    coordinator: Arc<MigrationCoordinator>,
    reaper: Arc<RetentionReaper>,
    gate: TenantGate,
    events: EventBus,
}

impl TenancyEngine {
    /// Build an engine over caller-supplied backends. The shared pool
    /// target must already be registered in `pool`.
    pub fn new(
        config: GateConfig,
        registry: Arc<dyn TierRegistry>,
        pool: Arc<TargetPool>,
        provisioner: Arc<dyn TargetProvisioner>,
        resolver: Arc<dyn TenantResolver>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        let guard = QueryGuard::new(config.tenant_field.clone());

        let router = Arc::new(ShardRouter::new(
            registry.clone(),
            config.shared_pool.clone(),
            config.routing.clone(),
            events.clone(),
        ));
        let reaper = Arc::new(RetentionReaper::new(
            registry.clone(),
            pool.clone(),
            guard.clone(),
            events.clone(),
            config.retention_window,
        ));
        let coordinator = Arc::new(MigrationCoordinator::new(
            router.clone(),
            pool.clone(),
            provisioner,
            reaper.clone(),
            guard,
            events.clone(),
            config.write_hold_timeout,
        ));
        let gate = TenantGate::new(
            &config,
            resolver,
            router.clone(),
            pool.clone(),
            coordinator.clone(),
            events.clone(),
        );

        Self {
            config,
            registry,
            pool,
            router,
            coordinator,
            reaper,
            gate,
            events,
        }
    }

    /// Single-process engine on in-memory registry and stores, resolving
    /// tenants from the configured session claim.
    pub fn in_memory(config: GateConfig) -> Self {
        let pool = Arc::new(TargetPool::new());
        let shared = config.shared_pool.clone();
        pool.register(
            shared.clone(),
            Arc::new(MemoryStore::new(shared.clone())) as Arc<dyn StoreDriver>,
        );
        let provisioner = Arc::new(MemoryProvisioner::new(
            pool.clone(),
            shared,
            config.shard_count,
        ));
        let resolver = Arc::new(ClaimResolver::new(config.tenant_claim.clone()));

        Self::new(
            config,
            Arc::new(MemoryTierRegistry::new()),
            pool,
            provisioner,
            resolver,
        )
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn gate(&self) -> &TenantGate {
        &self.gate
    }

    pub fn router(&self) -> &Arc<ShardRouter> {
        &self.router
    }

    pub fn coordinator(&self) -> &Arc<MigrationCoordinator> {
        &self.coordinator
    }

    pub fn reaper(&self) -> &Arc<RetentionReaper> {
        &self.reaper
    }

    pub fn registry(&self) -> &Arc<dyn TierRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<TargetPool> {
        &self.pool
    }

    /// Operator entry point: start moving `tenant` to `tier`.
    pub async fn trigger_migration(
        &self,
        tenant: &TenantId,
        tier: Tier,
    ) -> TenancyResult<MigrationHandle> {
        self.coordinator.trigger_migration(tenant, tier).await
    }

    pub fn migration_status(&self, handle: &MigrationHandle) -> TenancyResult<MigrationStatus> {
        self.coordinator.migration_status(handle)
    }

    pub fn subscribe(&self) -> BoxStream<GateEvent> {
        self.events.subscribe()
    }

    /// Spawn the retention reaper on the current runtime.
    pub fn spawn_reaper(&self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(self.reaper.clone().start(every))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Session;
    use crate::types::{Filter, PhysicalTarget};
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_engine_serves_the_shared_pool() {
        let engine = TenancyEngine::in_memory(GateConfig::new().with_shared_pool("main"));
        let session = Session::new().with_claim("tenant_id", "t1");

        engine
            .gate()
            .create(&session, json!({"id": "r1"}))
            .await
            .unwrap();
        let found = engine.gate().find(&session, Filter::by_id("r1")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(engine.pool().targets(), vec![PhysicalTarget::shared_pool("main")]);
    }

    #[tokio::test]
    async fn operator_surface_round_trip() {
        let engine = TenancyEngine::in_memory(GateConfig::new());
        let t1 = TenantId::new("t1");

        let handle = engine.trigger_migration(&t1, Tier::Dedicated).await.unwrap();
        let status = engine.migration_status(&handle).unwrap();
        assert_eq!(status.tenant_id, t1);
        assert_eq!(status.from_tier, Tier::Shared);
        assert_eq!(status.to_tier, Tier::Dedicated);
    }

    #[tokio::test]
    async fn custom_claim_and_field_are_honoured() {
        let config = GateConfig::new()
            .with_tenant_claim("org")
            .with_tenant_field("orgId");
        let engine = TenancyEngine::in_memory(config);
        let session = Session::new().with_claim("org", "o1");

        let created = engine
            .gate()
            .create(&session, json!({"title": "x"}))
            .await
            .unwrap();
        assert_eq!(created["orgId"], json!("o1"));
        assert!(created.get("tenantId").is_none());
    }
}
