//! The gate every tenant operation passes through:
//! resolve → guard → route → store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dog_core::TenantContext;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::GateConfig;
use crate::driver::{dispatch, TargetPool};
use crate::events::EventBus;
use crate::guard::{GuardedOperation, QueryGuard};
use crate::migration::{JournalEntry, MigrationCoordinator};
use crate::resolver::{Session, TenantResolver};
use crate::retry::RetryPolicy;
use crate::router::{Route, ShardRouter};
use crate::types::{Document, Filter, GateEvent, OpKind, OpOutcome, Operation};
use crate::{TenancyError, TenancyResult};

/// Tenant-scoped access gate.
///
/// Reads go straight to the routed target. Writes first take a permit on the
/// tenant's write barrier and only then route, so a write held behind a
/// cutover lands wherever the registry points once the swap is done.
pub struct TenantGate {
    resolver: Arc<dyn TenantResolver>,
    guard: QueryGuard,
    router: Arc<ShardRouter>,
    pool: Arc<TargetPool>,
    coordinator: Arc<MigrationCoordinator>,
    events: EventBus,
    retry: RetryPolicy,
    resolve_timeout: Duration,
    write_hold_timeout: Duration,
}

impl TenantGate {
    pub fn new(
        config: &GateConfig,
        resolver: Arc<dyn TenantResolver>,
        router: Arc<ShardRouter>,
        pool: Arc<TargetPool>,
        coordinator: Arc<MigrationCoordinator>,
        events: EventBus,
    ) -> Self {
        Self {
            resolver,
            guard: QueryGuard::new(config.tenant_field.clone()),
            router,
            pool,
            coordinator,
            events,
            retry: config.routing.clone(),
            resolve_timeout: config.resolve_timeout,
            write_hold_timeout: config.write_hold_timeout,
        }
    }

    pub fn guard(&self) -> &QueryGuard {
        &self.guard
    }

    /// Run one operation on behalf of `session`.
    #[instrument(skip_all, fields(kind = %op.kind))]
    pub async fn execute(&self, session: &Session, op: Operation) -> TenancyResult<OpOutcome> {
        let ctx = self.resolve(session).await?;
        let kind = op.kind;

        let guarded = match self.guard.guard(op, &ctx.tenant_id) {
            Ok(guarded) => guarded,
            Err(err) => {
                if let TenancyError::TenantMismatch { attempted, .. } = &err {
                    self.report_mismatch(session, &ctx, kind, attempted);
                }
                return Err(err);
            }
        };

        let outcome = if guarded.is_write() {
            self.write(&guarded).await?
        } else {
            let route = self.router.route(&ctx.tenant_id).await?;
            self.dispatch_routed(&route, &guarded).await?
        };

        debug!(
            tenant_id = %ctx.tenant_id,
            request_id = ?ctx.request_id,
            affected = outcome.affected(),
            "operation served"
        );
        Ok(outcome)
    }

    pub async fn find(&self, session: &Session, filter: Filter) -> TenancyResult<Vec<Document>> {
        self.execute(session, Operation::find(filter))
            .await
            .map(OpOutcome::into_documents)
    }

    pub async fn create(&self, session: &Session, data: Value) -> TenancyResult<Document> {
        match self.execute(session, Operation::create(data)).await? {
            OpOutcome::Created(doc) => Ok(doc),
            other => Err(TenancyError::Internal(format!(
                "create produced a {} outcome",
                other.kind()
            ))),
        }
    }

    pub async fn update(
        &self,
        session: &Session,
        filter: Filter,
        patch: Value,
    ) -> TenancyResult<Vec<Document>> {
        self.execute(session, Operation::update(filter, patch))
            .await
            .map(OpOutcome::into_documents)
    }

    pub async fn delete(&self, session: &Session, filter: Filter) -> TenancyResult<Vec<Document>> {
        self.execute(session, Operation::delete(filter))
            .await
            .map(OpOutcome::into_documents)
    }

    async fn resolve(&self, session: &Session) -> TenancyResult<TenantContext> {
        let ctx = tokio::time::timeout(self.resolve_timeout, self.resolver.resolve(session))
            .await
            .map_err(|_| {
                TenancyError::missing_context(format!(
                    "tenant resolution timed out after {:?}",
                    self.resolve_timeout
                ))
            })??;

        if ctx.tenant_id.is_blank() {
            return Err(TenancyError::missing_context("resolver returned a blank tenant id"));
        }
        Ok(ctx)
    }

    async fn write(&self, op: &GuardedOperation) -> TenancyResult<OpOutcome> {
        let tenant = op.tenant();
        let barrier = self.coordinator.barrier();
        let permit = barrier.admit(tenant, self.write_hold_timeout).await?;
        let written = self.write_admitted(op).await;
        drop(permit);
        barrier.release_idle(tenant);
        written
    }

    async fn write_admitted(&self, op: &GuardedOperation) -> TenancyResult<OpOutcome> {
        let tenant = op.tenant();
        let route = self.router.route(tenant).await?;

        match self.coordinator.journal().active(tenant) {
            Some(log) => {
                let mut log = log.lock().await;
                let outcome = self.dispatch_routed(&route, op).await?;
                log.extend(JournalEntry::from_outcome(&outcome));
                Ok(outcome)
            }
            None => self.dispatch_routed(&route, op).await,
        }
    }

    /// Send a guarded operation to the routed target. Only reads are
    /// retried: a store may fail after it applied a write, and replaying it
    /// could insert twice.
    async fn dispatch_routed(
        &self,
        route: &Route,
        op: &GuardedOperation,
    ) -> TenancyResult<OpOutcome> {
        let pool = &self.pool;
        let target = &route.target;
        let call = move || async move {
            let driver = pool.driver(target)?;
            dispatch(driver.as_ref(), op).await
        };

        let dispatched = if op.is_write() {
            call().await
        } else {
            self.retry.run("store read", call).await
        };
        dispatched.map_err(|err| {
            if err.is_transient() {
                TenancyError::routing_unavailable(&route.tenant_id, err.to_string())
            } else {
                err
            }
        })
    }

    fn report_mismatch(
        &self,
        session: &Session,
        ctx: &TenantContext,
        kind: OpKind,
        attempted: &str,
    ) {
        warn!(
            target: "dog_tenancy::security",
            tenant_id = %ctx.tenant_id,
            principal = ?session.principal,
            attempted,
            operation = %kind,
            request_id = ?ctx.request_id,
            "cross-tenant access rejected"
        );
        self.events.emit(GateEvent::TenantMismatch {
            tenant_id: ctx.tenant_id.clone(),
            principal: session.principal.clone(),
            attempted: attempted.to_string(),
            operation: kind,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MemoryProvisioner, MemoryStore};
    use crate::engine::TenancyEngine;
    use crate::registry::{MemoryTierRegistry, TierRegistry};
    use crate::resolver::ClaimResolver;
    use crate::types::PhysicalTarget;
    use async_trait::async_trait;
    use dog_core::TenantId;
    use futures::StreamExt;
    use serde_json::json;

    struct Harness {
        engine: TenancyEngine,
        registry: Arc<MemoryTierRegistry>,
        shared: Arc<MemoryStore>,
    }

    fn harness_with(config: GateConfig, resolver: Arc<dyn TenantResolver>) -> Harness {
        let registry = Arc::new(MemoryTierRegistry::new());
        let pool = Arc::new(TargetPool::new());
        let shared = Arc::new(MemoryStore::new(config.shared_pool.clone()));
        pool.register(config.shared_pool.clone(), shared.clone());
        let provisioner = Arc::new(MemoryProvisioner::new(
            pool.clone(),
            config.shared_pool.clone(),
            config.shard_count,
        ));

        let engine = TenancyEngine::new(config, registry.clone(), pool, provisioner, resolver);
        Harness {
            engine,
            registry,
            shared,
        }
    }

    fn harness() -> Harness {
        let config = GateConfig::new()
            .with_shared_pool("main")
            .with_routing(RetryPolicy {
                max_attempts: 2,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            });
        harness_with(config, Arc::new(ClaimResolver::default()))
    }

    fn session(tenant: &str) -> Session {
        Session::new().with_claim("tenant_id", tenant)
    }

    #[tokio::test]
    async fn create_then_find_is_tenant_scoped() {
        let h = harness();
        let gate = h.engine.gate();

        let created = gate
            .create(&session("a"), json!({"title": "hello"}))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let mine = gate.find(&session("a"), Filter::by_id(id.clone())).await.unwrap();
        assert_eq!(mine, vec![created]);

        let theirs = gate.find(&session("b"), Filter::by_id(id)).await.unwrap();
        assert!(theirs.is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_stay_in_the_callers_tenant() {
        let h = harness();
        let gate = h.engine.gate();
        gate.create(&session("a"), json!({"id": "r1", "n": 1}))
            .await
            .unwrap();
        gate.create(&session("b"), json!({"id": "r1", "n": 1}))
            .await
            .unwrap();

        let updated = gate
            .update(&session("a"), Filter::by_id("r1"), json!({"n": 2}))
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);

        let b = gate.find(&session("b"), Filter::by_id("r1")).await.unwrap();
        assert_eq!(b[0]["n"], json!(1));

        let removed = gate.delete(&session("a"), Filter::new()).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(h.shared.record_count(&TenantId::new("b")), 1);
    }

    #[tokio::test]
    async fn missing_claim_is_rejected_before_routing() {
        let h = harness();
        let err = h
            .engine
            .gate()
            .find(&Session::new(), Filter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::MissingTenantContext { .. }));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn mismatch_is_reported_and_never_reaches_the_store() {
        let h = harness();
        let mut events = h.engine.subscribe();

        let err = h
            .engine
            .gate()
            .find(&session("a"), Filter::new().eq("tenantId", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::TenantMismatch { .. }));
        assert_eq!(h.shared.call_count(), 0);

        let event = events.next().await.unwrap();
        assert_eq!(event.event_name(), "tenant_mismatch");
        assert_eq!(event.tenant_id().as_str(), "a");
    }

    #[tokio::test]
    async fn unreachable_target_surfaces_routing_unavailable() {
        let h = harness();
        h.shared.set_unavailable(true);

        let err = h
            .engine
            .gate()
            .find(&session("a"), Filter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::RoutingUnavailable { .. }));
    }

    #[tokio::test]
    async fn unknown_tenant_lands_on_the_shared_pool() {
        let h = harness();
        h.engine
            .gate()
            .create(&session("t1"), json!({"title": "first"}))
            .await
            .unwrap();

        let record = h.registry.get(&TenantId::new("t1")).await.unwrap().unwrap();
        assert_eq!(record.target, PhysicalTarget::shared_pool("main"));
        assert_eq!(h.shared.record_count(&TenantId::new("t1")), 1);
    }

    #[tokio::test]
    async fn reads_are_retried_but_writes_are_not() {
        let h = harness();
        let gate = h.engine.gate();
        gate.create(&session("a"), json!({"id": "r1"})).await.unwrap();

        h.shared.fail_next_calls(1);
        let found = gate.find(&session("a"), Filter::by_id("r1")).await.unwrap();
        assert_eq!(found.len(), 1);

        h.shared.fail_next_calls(1);
        let calls = h.shared.call_count();
        let err = gate
            .create(&session("a"), json!({"id": "r2"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::RoutingUnavailable { .. }));
        assert_eq!(h.shared.call_count(), calls);
        assert_eq!(h.shared.record_count(&TenantId::new("a")), 1);
    }

    struct SlowResolver;

    #[async_trait]
    impl TenantResolver for SlowResolver {
        async fn resolve(&self, _session: &Session) -> TenancyResult<TenantContext> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(TenantContext::new("late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_resolution_is_abandoned() {
        let config = GateConfig::new().with_resolve_timeout(Duration::from_millis(50));
        let h = harness_with(config, Arc::new(SlowResolver));

        let err = h
            .engine
            .gate()
            .create(&session("a"), json!({"title": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::MissingTenantContext { .. }));
        assert!(h.registry.is_empty());
        assert_eq!(h.shared.call_count(), 0);
    }
}
