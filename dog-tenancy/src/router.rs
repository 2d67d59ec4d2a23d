//! Shard router: tenant → physical target.

use std::sync::Arc;

use chrono::Utc;
use dog_core::TenantId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::events::EventBus;
use crate::registry::TierRegistry;
use crate::retry::RetryPolicy;
use crate::types::{GateEvent, PhysicalTarget, TenantTierRecord, Tier};
use crate::{TenancyError, TenancyResult};

/// Where one operation for a tenant must go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub tenant_id: TenantId,
    pub tier: Tier,
    pub target: PhysicalTarget,
    /// Registry record version the route was read from
    pub version: u64,
}

impl From<TenantTierRecord> for Route {
    fn from(record: TenantTierRecord) -> Self {
        Self {
            tenant_id: record.tenant_id,
            tier: record.tier,
            target: record.target,
            version: record.version,
        }
    }
}

/// Looks tenants up in the tier registry. Unknown tenants start on the
/// shared pool and get a record on first use.
///
/// The registry keeps naming a migrating tenant's old target until the
/// cutover swap, so routing needs no migration awareness of its own: reads
/// and writes both follow the registry.
pub struct ShardRouter {
    registry: Arc<dyn TierRegistry>,
    shared_pool: PhysicalTarget,
    retry: RetryPolicy,
    events: EventBus,
}

impl ShardRouter {
    pub fn new(
        registry: Arc<dyn TierRegistry>,
        shared_pool: PhysicalTarget,
        retry: RetryPolicy,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            shared_pool,
            retry,
            events,
        }
    }

    pub fn shared_pool(&self) -> &PhysicalTarget {
        &self.shared_pool
    }

    pub fn registry(&self) -> &Arc<dyn TierRegistry> {
        &self.registry
    }

    /// Resolve the current target for `tenant`, retrying transient
    /// registry failures before surfacing `RoutingUnavailable`.
    #[instrument(skip(self), fields(tenant_id = %tenant))]
    pub async fn route(&self, tenant: &TenantId) -> TenancyResult<Route> {
        let this = self;
        self.retry
            .run("tier lookup", move || async move { this.lookup_or_onboard(tenant).await })
            .await
            .map_err(|err| match err {
                TenancyError::RegistryUnavailable(reason) => {
                    TenancyError::routing_unavailable(tenant, reason)
                }
                other => other,
            })
    }

    async fn lookup_or_onboard(&self, tenant: &TenantId) -> TenancyResult<Route> {
        if let Some(record) = self.registry.get(tenant).await? {
            debug!(tier = %record.tier, target = %record.target, "routed");
            return Ok(record.into());
        }

        let record =
            TenantTierRecord::onboard(tenant.clone(), Tier::Shared, self.shared_pool.clone());

        if self
            .registry
            .compare_and_swap(tenant, None, record.clone())
            .await?
        {
            info!(target_pool = %record.target, "unknown tenant onboarded to shared pool");
            self.events.emit(GateEvent::TierAssigned {
                tenant_id: tenant.clone(),
                tier: record.tier,
                target: record.target.clone(),
                at: Utc::now(),
            });
            return Ok(record.into());
        }

        // Lost the onboarding race: whoever won wrote the record.
        match self.registry.get(tenant).await? {
            Some(record) => Ok(record.into()),
            None => Err(TenancyError::RegistryUnavailable(format!(
                "tier record for {tenant} vanished after concurrent onboarding"
            ))),
        }
    }
}
