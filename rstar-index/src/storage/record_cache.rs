//! Write-back LRU cache for node records.
//!
//! Records are loaded only when first accessed. Writes land in the cache
//! marked dirty and reach the file on eviction or flush.

use std::num::NonZeroUsize;

use lru::LruCache;

use super::record_codec::NodeRecord;
use crate::rtree::NodeId;

/// A cached record with its dirty flag
#[derive(Debug, Clone)]
pub(crate) struct CachedRecord {
    pub record: NodeRecord,
    pub dirty: bool,
}

pub(crate) struct RecordCache {
    records: LruCache<NodeId, CachedRecord>,
}

impl RecordCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            records: LruCache::new(capacity),
        }
    }

    /// Looks a record up and marks it most recently used.
    pub fn get(&mut self, id: NodeId) -> Option<&NodeRecord> {
        self.records.get(&id).map(|cached| &cached.record)
    }

    /// Caches a record. Returns the least recently used record if the cache
    /// had to make room for it. Replacing a dirty record keeps it dirty.
    pub fn insert(
        &mut self,
        id: NodeId,
        record: NodeRecord,
        dirty: bool,
    ) -> Option<(NodeId, CachedRecord)> {
        let dirty = dirty || self.records.peek(&id).is_some_and(|c| c.dirty);
        match self.records.push(id, CachedRecord { record, dirty }) {
            Some((evicted, _)) if evicted == id => None,
            other => other,
        }
    }

    /// Handles of dirty records, least recently used first.
    pub fn dirty_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .records
            .iter()
            .filter(|(_, cached)| cached.dirty)
            .map(|(id, _)| *id)
            .collect();
        ids.reverse();
        ids
    }

    pub fn peek(&self, id: NodeId) -> Option<&CachedRecord> {
        self.records.peek(&id)
    }

    pub fn mark_clean(&mut self, id: NodeId) {
        if let Some(cached) = self.records.peek_mut(&id) {
            cached.dirty = false;
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
