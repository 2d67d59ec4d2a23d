use std::sync::Arc;

use dashmap::DashMap;
use dog_core::TenantId;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::types::{Document, OpOutcome, ID_FIELD};

/// One write observed on the old target while a migration copies data.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    /// Record now looks like this (create or update)
    Put(Document),
    /// Record with this id is gone
    Remove(String),
}

impl JournalEntry {
    /// Entries describing what a write did to the store.
    pub fn from_outcome(outcome: &OpOutcome) -> Vec<JournalEntry> {
        match outcome {
            OpOutcome::Found(_) => Vec::new(),
            OpOutcome::Created(doc) => vec![JournalEntry::Put(doc.clone())],
            OpOutcome::Updated(docs) => docs.iter().cloned().map(JournalEntry::Put).collect(),
            OpOutcome::Deleted(docs) => docs
                .iter()
                .filter_map(|doc| match doc.get(ID_FIELD) {
                    Some(Value::String(id)) => Some(JournalEntry::Remove(id.clone())),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Entries for one tenant. The async mutex is held across the store call
/// and the append, so the journal order matches the order writes hit the
/// old target.
pub type JournalLog = Arc<Mutex<Vec<JournalEntry>>>;

/// Captures writes made to a tenant's old target between the start of
/// backfill and cutover, so cutover can replay them on the new target.
#[derive(Default)]
pub struct WriteJournal {
    logs: DashMap<TenantId, JournalLog>,
}

impl WriteJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording writes for `tenant`, discarding any stale log.
    pub fn activate(&self, tenant: &TenantId) {
        self.logs.insert(tenant.clone(), Arc::default());
    }

    /// Log for `tenant`, if its writes are currently recorded.
    pub fn active(&self, tenant: &TenantId) -> Option<JournalLog> {
        self.logs.get(tenant).map(|log| log.value().clone())
    }

    /// Stop recording and hand back everything logged so far.
    pub async fn take(&self, tenant: &TenantId) -> Vec<JournalEntry> {
        match self.logs.remove(tenant) {
            Some((_, log)) => std::mem::take(&mut *log.lock().await),
            None => Vec::new(),
        }
    }

    /// Stop recording and throw the log away.
    pub fn discard(&self, tenant: &TenantId) {
        self.logs.remove(tenant);
    }

    pub fn is_active(&self, tenant: &TenantId) -> bool {
        self.logs.contains_key(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn outcomes_map_to_entries() {
        let created = OpOutcome::Created(doc(json!({"id": "r1"})));
        assert_eq!(
            JournalEntry::from_outcome(&created),
            vec![JournalEntry::Put(doc(json!({"id": "r1"})))]
        );

        let deleted = OpOutcome::Deleted(vec![doc(json!({"id": "r1"})), doc(json!({"id": "r2"}))]);
        assert_eq!(
            JournalEntry::from_outcome(&deleted),
            vec![
                JournalEntry::Remove("r1".into()),
                JournalEntry::Remove("r2".into())
            ]
        );

        assert!(JournalEntry::from_outcome(&OpOutcome::Found(vec![doc(json!({"id": "r1"}))]))
            .is_empty());
    }

    #[tokio::test]
    async fn records_only_while_active() {
        let journal = WriteJournal::new();
        let t1 = TenantId::new("t1");
        assert!(journal.active(&t1).is_none());

        journal.activate(&t1);
        let log = journal.active(&t1).unwrap();
        log.lock().await.push(JournalEntry::Remove("r1".into()));

        let entries = journal.take(&t1).await;
        assert_eq!(entries, vec![JournalEntry::Remove("r1".into())]);
        assert!(!journal.is_active(&t1));
        assert!(journal.take(&t1).await.is_empty());
    }

    #[tokio::test]
    async fn discard_drops_the_log() {
        let journal = WriteJournal::new();
        let t1 = TenantId::new("t1");
        journal.activate(&t1);
        journal.discard(&t1);
        assert!(journal.active(&t1).is_none());
    }
}
