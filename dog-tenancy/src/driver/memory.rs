use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dog_core::TenantId;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::driver::StoreDriver;
use crate::guard::{ScopedDocument, ScopedFilter};
use crate::types::{Document, PhysicalTarget, ID_FIELD};
use crate::{TenancyError, TenancyResult};

// tenant -> record id -> record
type TenantIndex = HashMap<TenantId, BTreeMap<String, Document>>;

/// In-memory document store standing in for one physical target.
///
/// Records are indexed by tenant first, so a lookup only ever walks the
/// calling tenant's bucket.
pub struct MemoryStore {
    target: PhysicalTarget,
    records: RwLock<TenantIndex>,
    archived: RwLock<TenantIndex>,
    unavailable: AtomicBool,
    failing_calls: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(target: PhysicalTarget) -> Self {
        Self {
            target,
            records: RwLock::new(HashMap::new()),
            archived: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            failing_calls: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn target(&self) -> &PhysicalTarget {
        &self.target
    }

    /// Live records held for `tenant`.
    pub fn record_count(&self, tenant: &TenantId) -> usize {
        self.records.read().get(tenant).map_or(0, |m| m.len())
    }

    pub fn archived_count(&self, tenant: &TenantId) -> usize {
        self.archived.read().get(tenant).map_or(0, |m| m.len())
    }

    /// Number of driver calls served so far (for testing)
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail every call as unreachable (for testing)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `count` calls fail as unreachable (for testing)
    pub fn fail_next_calls(&self, count: usize) {
        self.failing_calls.store(count, Ordering::SeqCst);
    }

    fn enter(&self) -> TenancyResult<()> {
        let failing = self
            .failing_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing || self.unavailable.load(Ordering::SeqCst) {
            return Err(TenancyError::TargetUnavailable(format!(
                "{} is unreachable",
                self.target
            )));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn record_id(doc: &Document) -> TenancyResult<Option<String>> {
    match doc.get(ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(Some(id.clone())),
        Some(other) => Err(TenancyError::InvalidOperation(format!(
            "record id must be a non-empty string, got {other}"
        ))),
    }
}

#[async_trait]
impl StoreDriver for MemoryStore {
    async fn find(&self, filter: &ScopedFilter) -> TenancyResult<Vec<Document>> {
        self.enter()?;
        let records = self.records.read();
        Ok(records
            .get(filter.tenant())
            .into_iter()
            .flat_map(|bucket| bucket.values())
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    async fn create(&self, doc: ScopedDocument) -> TenancyResult<Document> {
        self.enter()?;
        let tenant = doc.tenant().clone();
        let mut doc = doc.into_document();

        let id = match record_id(&doc)? {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut records = self.records.write();
        let bucket = records.entry(tenant).or_default();
        if bucket.contains_key(&id) {
            return Err(TenancyError::DuplicateRecord { id });
        }
        bucket.insert(id, doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        filter: &ScopedFilter,
        patch: &ScopedDocument,
    ) -> TenancyResult<Vec<Document>> {
        self.enter()?;
        let mut records = self.records.write();
        let Some(bucket) = records.get_mut(filter.tenant()) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for doc in bucket.values_mut().filter(|doc| filter.matches(doc)) {
            for (field, value) in patch.document() {
                if field == ID_FIELD {
                    continue;
                }
                doc.insert(field.clone(), value.clone());
            }
            updated.push(doc.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, filter: &ScopedFilter) -> TenancyResult<Vec<Document>> {
        self.enter()?;
        let mut records = self.records.write();
        let Some(bucket) = records.get_mut(filter.tenant()) else {
            return Ok(Vec::new());
        };

        let ids: Vec<String> = bucket
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id.clone())
            .collect();

        Ok(ids.iter().filter_map(|id| bucket.remove(id)).collect())
    }

    async fn upsert(&self, doc: ScopedDocument) -> TenancyResult<()> {
        self.enter()?;
        let tenant = doc.tenant().clone();
        let doc = doc.into_document();
        let id = record_id(&doc)?
            .ok_or_else(|| TenancyError::Store("upsert requires a record id".to_string()))?;

        self.records
            .write()
            .entry(tenant)
            .or_default()
            .insert(id, doc);
        Ok(())
    }

    async fn archive(&self, filter: &ScopedFilter) -> TenancyResult<usize> {
        self.enter()?;
        let mut records = self.records.write();
        let Some(bucket) = records.get_mut(filter.tenant()) else {
            return Ok(0);
        };

        let ids: Vec<String> = bucket
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id.clone())
            .collect();

        let mut archived = self.archived.write();
        let shelf = archived.entry(filter.tenant().clone()).or_default();
        for id in &ids {
            if let Some(doc) = bucket.remove(id) {
                shelf.insert(id.clone(), doc);
            }
        }
        Ok(ids.len())
    }
}
