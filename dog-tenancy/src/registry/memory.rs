use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dog_core::TenantId;

use crate::registry::TierRegistry;
use crate::{TenancyError, TenancyResult, TenantTierRecord};

/// In-memory tier registry for tests and single-process deployments.
///
/// Records live in a sharded map, so lookups and swaps for different
/// tenants never contend on the same lock.
#[derive(Default)]
pub struct MemoryTierRegistry {
    records: DashMap<TenantId, TenantTierRecord>,
    unavailable: AtomicBool,
    failing_reads: AtomicU32,
}

impl MemoryTierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly (onboarding path).
    pub fn insert(&self, record: TenantTierRecord) {
        self.records.insert(record.tenant_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of all records, ordered by tenant id.
    pub fn records(&self) -> Vec<TenantTierRecord> {
        let mut all: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        all
    }

    /// Make every call fail as unavailable (for testing)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `count` reads fail as unavailable (for testing)
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> TenancyResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TenancyError::RegistryUnavailable(
                "registry marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn take_read_failure(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TierRegistry for MemoryTierRegistry {
    async fn get(&self, tenant: &TenantId) -> TenancyResult<Option<TenantTierRecord>> {
        self.check_available()?;
        if self.take_read_failure() {
            return Err(TenancyError::RegistryUnavailable(
                "injected read failure".to_string(),
            ));
        }
        Ok(self.records.get(tenant).map(|r| r.value().clone()))
    }

    async fn compare_and_swap(
        &self,
        tenant: &TenantId,
        expected: Option<&TenantTierRecord>,
        new: TenantTierRecord,
    ) -> TenancyResult<bool> {
        self.check_available()?;
        if new.tenant_id != *tenant {
            return Err(TenancyError::Internal(format!(
                "record for {} written under key {tenant}",
                new.tenant_id
            )));
        }

        // The entry guard holds this tenant's shard lock for the whole
        // compare + replace.
        let swapped = match self.records.entry(tenant.clone()) {
            Entry::Occupied(mut current) => match expected {
                Some(expected) if current.get() == expected => {
                    current.insert(new);
                    true
                }
                _ => false,
            },
            Entry::Vacant(slot) => {
                if expected.is_none() {
                    slot.insert(new);
                    true
                } else {
                    false
                }
            }
        };
        Ok(swapped)
    }
}
