// In-memory attribute store
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use panelx_core::{AttributeStore, Condition, Filter, PanelId, PanelIdSet, PanelRecord, Result};

/// Attribute store backed by a hash map; predicates are evaluated by scan
#[derive(Debug, Default)]
pub struct MemoryAttributeStore {
    records: RwLock<HashMap<PanelId, PanelRecord>>,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I: IntoIterator<Item = PanelRecord>>(records: I) -> Self {
        let store = Self::new();
        store.upsert_batch(records);
        store
    }

    /// Insert or replace a record
    pub fn upsert(&self, record: PanelRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    pub fn upsert_batch<I: IntoIterator<Item = PanelRecord>>(&self, records: I) {
        let mut map = self.records.write();
        for record in records {
            map.insert(record.id.clone(), record);
        }
    }

    pub fn delete(&self, id: &PanelId) -> bool {
        self.records.write().remove(id).is_some()
    }

    pub fn get(&self, id: &PanelId) -> Option<PanelRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Snapshot of every record, ordered by id
    pub fn records(&self) -> Vec<PanelRecord> {
        let mut records: Vec<PanelRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

#[async_trait]
impl AttributeStore for MemoryAttributeStore {
    async fn query_by_predicates(&self, predicate: &Condition) -> Result<PanelIdSet> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|record| predicate.matches(record))
            .map(|record| record.id.clone())
            .collect())
    }

    async fn fetch_by_ids(&self, ids: &[PanelId]) -> Result<Vec<PanelRecord>> {
        let records = self.records.read();
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }
}
