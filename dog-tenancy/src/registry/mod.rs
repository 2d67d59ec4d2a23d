pub mod memory;

use async_trait::async_trait;
use dog_core::TenantId;

use crate::{TenancyResult, TenantTierRecord};

pub use memory::MemoryTierRegistry;

/// Durable tenant → tier/target mapping.
///
/// Only two primitives are exposed. Readers get a consistent snapshot of one
/// record; writers replace a record with a single compare-and-swap, so
/// concurrent routers never see a half-updated record.
#[async_trait]
pub trait TierRegistry: Send + Sync {
    async fn get(&self, tenant: &TenantId) -> TenancyResult<Option<TenantTierRecord>>;

    /// Replace the record for `tenant` with `new` iff the stored record
    /// equals `expected` (`None` = no record yet). Returns whether the swap
    /// happened.
    async fn compare_and_swap(
        &self,
        tenant: &TenantId,
        expected: Option<&TenantTierRecord>,
        new: TenantTierRecord,
    ) -> TenancyResult<bool>;
}
