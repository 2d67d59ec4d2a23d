//! # dog-tenancy: Tenant-Scoped Access Gate
//!
//! Every operation against the document stores passes through one gate:
//!
//! 1. **Resolve** the tenant from trusted session state ([`TenantResolver`])
//! 2. **Guard** the operation: inject the tenant predicate, reject any
//!    caller-supplied predicate naming another tenant ([`QueryGuard`])
//! 3. **Route** to the physical target holding the tenant's data
//!    ([`ShardRouter`] over a [`TierRegistry`])
//! 4. **Dispatch** to that target's [`StoreDriver`]
//!
//! Tenants move between the `Shared`, `Sharded` and `Dedicated` tiers through
//! an explicit migration state machine ([`MigrationCoordinator`]) that keeps
//! serving from the old target until a single registry swap at cutover.
//!
//! ```rust
//! use dog_tenancy::prelude::*;
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let engine = TenancyEngine::in_memory(GateConfig::new());
//! let session = Session::new().with_claim("tenant_id", "acme");
//!
//! let doc = engine.gate().create(&session, json!({"title": "hello"})).await?;
//! let found = engine.gate().find(&session, Filter::new()).await?;
//! assert_eq!(found, vec![doc]);
//!
//! let handle = engine.trigger_migration(&"acme".into(), Tier::Dedicated).await?;
//! let status = engine.migration_status(&handle)?;
//! assert_eq!(status.to_tier, Tier::Dedicated);
//! # Ok::<(), TenancyError>(())
//! # });
//! # fn tokio_test_block<F: std::future::Future<Output = Result<(), TenancyError>>>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f).unwrap();
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod guard;
pub mod migration;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod router;
pub mod types;

#[cfg(feature = "tracing-basic")]
pub mod observability;

pub use config::GateConfig;
pub use driver::{
    dispatch, MemoryProvisioner, MemoryStore, StoreDriver, TargetPool, TargetProvisioner,
};
pub use engine::TenancyEngine;
pub use error::{TenancyError, TenancyResult};
pub use events::{BoxStream, EventBus};
pub use gate::TenantGate;
pub use guard::{GuardedOperation, QueryGuard, ScopedDocument, ScopedFilter};
pub use migration::{
    MigrationCoordinator, MigrationOutcome, MigrationState, MigrationStatus, RetentionReaper,
};
pub use registry::{MemoryTierRegistry, TierRegistry};
pub use resolver::{ClaimResolver, Session, TenantResolver};
pub use retry::RetryPolicy;
pub use router::{Route, ShardRouter};
pub use types::{
    Document, Filter, GateEvent, MigrationHandle, OpKind, OpOutcome, Operation, PhysicalTarget,
    TenantTierRecord, Tier, ID_FIELD,
};

pub use dog_core::{TenantContext, TenantId};

/// Everything needed to embed the gate
pub mod prelude {
    pub use crate::{
        ClaimResolver, GateConfig, Session, TenancyEngine, TenantGate, TenantResolver,
    };

    pub use crate::{
        Filter, MigrationHandle, MigrationState, MigrationStatus, OpOutcome, Operation, Tier,
    };

    pub use crate::{TenancyError, TenancyResult, TenantContext, TenantId};

    pub use crate::{StoreDriver, TierRegistry};

    pub use async_trait::async_trait;
}
