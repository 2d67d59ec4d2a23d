pub mod memory;
pub mod pool;
pub mod provisioner;

use async_trait::async_trait;

use crate::guard::{GuardedOperation, ScopedDocument, ScopedFilter};
use crate::types::{Document, OpOutcome};
use crate::TenancyResult;

pub use memory::MemoryStore;
pub use pool::TargetPool;
pub use provisioner::{MemoryProvisioner, TargetProvisioner};

/// Document store driver for one physical target.
///
/// Every method takes guard-scoped arguments, so a driver never sees an
/// operation without a tenant predicate.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    async fn find(&self, filter: &ScopedFilter) -> TenancyResult<Vec<Document>>;

    /// Insert a new record, generating an id when the document has none.
    async fn create(&self, doc: ScopedDocument) -> TenancyResult<Document>;

    /// Merge `patch` into every matching record and return the results.
    async fn update(
        &self,
        filter: &ScopedFilter,
        patch: &ScopedDocument,
    ) -> TenancyResult<Vec<Document>>;

    /// Remove every matching record and return what was removed.
    async fn delete(&self, filter: &ScopedFilter) -> TenancyResult<Vec<Document>>;

    /// Insert or replace a record by id. Used to copy and replay records
    /// between targets, so it must be idempotent.
    async fn upsert(&self, doc: ScopedDocument) -> TenancyResult<()>;

    /// Move every record matching `filter` out of the live set. Returns how
    /// many records were archived.
    async fn archive(&self, filter: &ScopedFilter) -> TenancyResult<usize>;
}

/// Run a guarded operation against a driver.
pub async fn dispatch(driver: &dyn StoreDriver, op: &GuardedOperation) -> TenancyResult<OpOutcome> {
    match op {
        GuardedOperation::Find(filter) => driver.find(filter).await.map(OpOutcome::Found),
        GuardedOperation::Create(doc) => driver.create(doc.clone()).await.map(OpOutcome::Created),
        GuardedOperation::Update { filter, patch } => {
            driver.update(filter, patch).await.map(OpOutcome::Updated)
        }
        GuardedOperation::Delete(filter) => driver.delete(filter).await.map(OpOutcome::Deleted),
    }
}
