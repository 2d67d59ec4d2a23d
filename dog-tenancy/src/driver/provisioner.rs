use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dog_core::TenantId;
use tracing::{debug, info};

use crate::driver::{MemoryStore, StoreDriver, TargetPool};
use crate::types::{PhysicalTarget, Tier};
use crate::{TenancyError, TenancyResult};

/// Allocates the physical target a tenant moves to during migration.
#[async_trait]
pub trait TargetProvisioner: Send + Sync {
    /// Allocate (or look up) a target for `tenant` on `tier` and make sure
    /// the pool can reach it.
    async fn provision(&self, tenant: &TenantId, tier: Tier) -> TenancyResult<PhysicalTarget>;

    /// Give back a target allocated by an aborted migration. Only targets
    /// owned by `tenant` alone are torn down.
    async fn release(&self, tenant: &TenantId, target: &PhysicalTarget) -> TenancyResult<()>;
}

/// Provisions in-memory stores into a [`TargetPool`].
///
/// - `Shared` → the configured shared pool
/// - `Sharded` → `shard://N`, N = FNV-1a(tenant id) mod `shard_count`
/// - `Dedicated` → `cluster://<tenant>`, a fresh store per tenant
pub struct MemoryProvisioner {
    pool: Arc<TargetPool>,
    shared_pool: PhysicalTarget,
    shard_count: u32,
    failing: AtomicBool,
}

impl MemoryProvisioner {
    pub fn new(pool: Arc<TargetPool>, shared_pool: PhysicalTarget, shard_count: u32) -> Self {
        Self {
            pool,
            shared_pool,
            shard_count: shard_count.max(1),
            failing: AtomicBool::new(false),
        }
    }

    /// Fail every provisioning call (for testing)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn target_for(&self, tenant: &TenantId, tier: Tier) -> PhysicalTarget {
        match tier {
            Tier::Shared => self.shared_pool.clone(),
            Tier::Sharded => PhysicalTarget::shard(shard_for(tenant, self.shard_count)),
            Tier::Dedicated => PhysicalTarget::cluster(tenant),
        }
    }
}

#[async_trait]
impl TargetProvisioner for MemoryProvisioner {
    async fn provision(&self, tenant: &TenantId, tier: Tier) -> TenancyResult<PhysicalTarget> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TenancyError::TargetUnavailable(format!(
                "cannot provision {tier} target for {tenant}"
            )));
        }

        let target = self.target_for(tenant, tier);
        let created = !self.pool.contains(&target);
        let for_pool = target.clone();
        self.pool.register_if_absent(target.clone(), move || {
            Arc::new(MemoryStore::new(for_pool)) as Arc<dyn StoreDriver>
        });

        if created {
            info!(tenant_id = %tenant, %target, %tier, "provisioned new target");
        } else {
            debug!(tenant_id = %tenant, %target, %tier, "reusing existing target");
        }
        Ok(target)
    }

    async fn release(&self, tenant: &TenantId, target: &PhysicalTarget) -> TenancyResult<()> {
        if target.is_dedicated() && *target == PhysicalTarget::cluster(tenant) {
            self.pool.remove(target);
            info!(tenant_id = %tenant, %target, "released dedicated target");
        }
        Ok(())
    }
}

/// Stable shard placement for the shard key.
pub fn shard_for(tenant: &TenantId, shard_count: u32) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let hash = tenant
        .as_str()
        .bytes()
        .fold(FNV_OFFSET, |acc, b| (acc ^ u64::from(b)).wrapping_mul(FNV_PRIME));
    (hash % u64::from(shard_count.max(1))) as u32
}
