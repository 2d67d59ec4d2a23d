use chrono::{DateTime, Utc};
use dog_core::TenantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Isolation level a tenant's data currently lives at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Shared pool, rows isolated by the tenant field only
    Shared,
    /// One of N shards, placed by hashing the tenant id
    Sharded,
    /// A cluster owned by a single tenant
    Dedicated,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Sharded => "sharded",
            Self::Dedicated => "dedicated",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a pool, shard or cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhysicalTarget(pub String);

impl PhysicalTarget {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn shared_pool(name: &str) -> Self {
        Self(format!("shared://{name}"))
    }

    pub fn shard(index: u32) -> Self {
        Self(format!("shard://{index}"))
    }

    pub fn cluster(tenant: &TenantId) -> Self {
        Self(format!("cluster://{tenant}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dedicated clusters hold exactly one tenant and can be torn down whole.
    pub fn is_dedicated(&self) -> bool {
        self.0.starts_with("cluster://")
    }
}

impl fmt::Display for PhysicalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a tenant lives. One record per tenant; only a migration cutover
/// replaces it, bumping `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantTierRecord {
    pub tenant_id: TenantId,
    pub tier: Tier,
    pub target: PhysicalTarget,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl TenantTierRecord {
    /// First record for a freshly onboarded tenant
    pub fn onboard(tenant_id: TenantId, tier: Tier, target: PhysicalTarget) -> Self {
        Self {
            tenant_id,
            tier,
            target,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    /// Successor record written at cutover
    pub fn migrated_to(&self, tier: Tier, target: PhysicalTarget) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            tier,
            target,
            version: self.version + 1,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrated_record_bumps_version() {
        let rec = TenantTierRecord::onboard(
            TenantId::new("t1"),
            Tier::Shared,
            PhysicalTarget::shared_pool("main"),
        );
        let next = rec.migrated_to(Tier::Dedicated, PhysicalTarget::cluster(&rec.tenant_id));

        assert_eq!(next.version, 2);
        assert_eq!(next.tier, Tier::Dedicated);
        assert_eq!(next.target.as_str(), "cluster://t1");
        assert!(next.target.is_dedicated());
        assert!(!rec.target.is_dedicated());
    }
}
