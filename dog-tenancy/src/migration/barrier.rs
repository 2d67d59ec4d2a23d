use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dog_core::TenantId;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::{TenancyError, TenancyResult};

/// Per-tenant write barrier.
///
/// Writes hold a shared permit for as long as they run. Cutover takes the
/// exclusive side, which waits for in-flight writes to drain and holds new
/// ones back until the registry swap is done.
#[derive(Default)]
pub struct WriteBarrier {
    gates: DashMap<TenantId, Arc<RwLock<()>>>,
}

/// Shared permit held by one write.
pub type WritePermit = OwnedRwLockReadGuard<()>;

/// Exclusive hold taken by cutover.
pub type CutoverHold = OwnedRwLockWriteGuard<()>;

impl WriteBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    fn gate(&self, tenant: &TenantId) -> Arc<RwLock<()>> {
        self.gates.entry(tenant.clone()).or_default().value().clone()
    }

    /// Admit one write, waiting at most `timeout` for a cutover hold to
    /// clear.
    pub async fn admit(&self, tenant: &TenantId, timeout: Duration) -> TenancyResult<WritePermit> {
        tokio::time::timeout(timeout, self.gate(tenant).read_owned())
            .await
            .map_err(|_| {
                TenancyError::routing_unavailable(
                    tenant,
                    format!("write held by cutover for more than {timeout:?}"),
                )
            })
    }

    /// Block new writes for `tenant` once in-flight ones have finished.
    pub async fn hold(&self, tenant: &TenantId, timeout: Duration) -> TenancyResult<CutoverHold> {
        tokio::time::timeout(timeout, self.gate(tenant).write_owned())
            .await
            .map_err(|_| {
                TenancyError::TargetUnavailable(format!(
                    "in-flight writes for {tenant} did not drain within {timeout:?}"
                ))
            })
    }

    /// Forget the tenant's gate when nobody holds or waits on it.
    pub fn release_idle(&self, tenant: &TenantId) {
        self.gates
            .remove_if(tenant, |_, gate| Arc::strong_count(gate) == 1);
    }

    pub fn tracked(&self) -> usize {
        self.gates.len()
    }

    pub fn is_held(&self, tenant: &TenantId) -> bool {
        self.gates
            .get(tenant)
            .is_some_and(|gate| gate.try_read().is_err())
    }
}
