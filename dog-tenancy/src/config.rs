use std::time::Duration;

use dog_core::DogConfigSnapshot;

use crate::retry::RetryPolicy;
use crate::types::PhysicalTarget;

/// Configuration for the tenancy gate
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Record field holding the owning tenant id
    pub tenant_field: String,

    /// Session claim the tenant id is resolved from
    pub tenant_claim: String,

    /// Resolution slower than this abandons the request
    pub resolve_timeout: Duration,

    /// How long a write may wait behind a cutover
    pub write_hold_timeout: Duration,

    /// Backoff for registry lookups and transient store failures
    pub routing: RetryPolicy,

    /// How long an old target stays readable after cutover
    pub retention_window: Duration,

    /// Where unknown tenants are placed
    pub shared_pool: PhysicalTarget,

    /// Number of shards for the `Sharded` tier
    pub shard_count: u32,

    /// Buffered events per subscriber
    pub event_capacity: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            tenant_field: "tenantId".to_string(),
            tenant_claim: "tenant_id".to_string(),
            resolve_timeout: Duration::from_secs(2),
            write_hold_timeout: Duration::from_secs(5),
            routing: RetryPolicy::default(),
            retention_window: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            shared_pool: PhysicalTarget::shared_pool("default"),
            shard_count: 16,
            event_capacity: 1024,
        }
    }
}

impl GateConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `tenancy.*` keys, keeping defaults for anything unset or
    /// unparsable.
    pub fn from_snapshot(snapshot: &DogConfigSnapshot) -> Self {
        let defaults = Self::default();
        let routing = RetryPolicy {
            max_attempts: snapshot
                .get_u64("tenancy.routing.maxAttempts")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.routing.max_attempts),
            base_backoff: snapshot
                .get_duration_ms("tenancy.routing.baseBackoffMs")
                .unwrap_or(defaults.routing.base_backoff),
            max_backoff: snapshot
                .get_duration_ms("tenancy.routing.maxBackoffMs")
                .unwrap_or(defaults.routing.max_backoff),
        };

        Self {
            tenant_field: snapshot
                .get_string("tenancy.tenantField")
                .unwrap_or(defaults.tenant_field),
            tenant_claim: snapshot
                .get_string("tenancy.tenantClaim")
                .unwrap_or(defaults.tenant_claim),
            resolve_timeout: snapshot
                .get_duration_ms("tenancy.resolveTimeoutMs")
                .unwrap_or(defaults.resolve_timeout),
            write_hold_timeout: snapshot
                .get_duration_ms("tenancy.writeHoldTimeoutMs")
                .unwrap_or(defaults.write_hold_timeout),
            routing,
            retention_window: snapshot
                .get_duration_secs("tenancy.retention.windowSecs")
                .unwrap_or(defaults.retention_window),
            shared_pool: snapshot
                .get("tenancy.sharedPool")
                .map(PhysicalTarget::shared_pool)
                .unwrap_or(defaults.shared_pool),
            shard_count: snapshot
                .get_u64("tenancy.shardCount")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.shard_count),
            event_capacity: snapshot
                .get_usize("tenancy.eventCapacity")
                .unwrap_or(defaults.event_capacity),
        }
    }

    /// Set the tenant field name
    pub fn with_tenant_field<S: Into<String>>(mut self, field: S) -> Self {
        self.tenant_field = field.into();
        self
    }

    /// Set the session claim carrying the tenant id
    pub fn with_tenant_claim<S: Into<String>>(mut self, claim: S) -> Self {
        self.tenant_claim = claim.into();
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_write_hold_timeout(mut self, timeout: Duration) -> Self {
        self.write_hold_timeout = timeout;
        self
    }

    /// Set routing retry policy
    pub fn with_routing(mut self, routing: RetryPolicy) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_retention_window(mut self, window: Duration) -> Self {
        self.retention_window = window;
        self
    }

    /// Name the shared pool unknown tenants start on
    pub fn with_shared_pool(mut self, name: &str) -> Self {
        self.shared_pool = PhysicalTarget::shared_pool(name);
        self
    }

    pub fn with_shard_count(mut self, shards: u32) -> Self {
        self.shard_count = shards.max(1);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}
