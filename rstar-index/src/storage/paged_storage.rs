//! File-backed node storage with fixed-size records.
//!
//! Records are read one at a time on demand and kept in a write-back LRU
//! cache sized from the configured buffer. Nothing is preloaded.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace, warn};
use parking_lot::Mutex;

use super::record_cache::RecordCache;
use super::record_codec::{
    decode_header, decode_record, encode_header, encode_record, entry_records, record_size_for,
    FileHeader, NodeRecord, RecordKind,
};
use super::{NodeStorage, StorageStats};
use crate::rtree::rtree_constants::{HEADER_SIZE, MIN_CACHED_RECORDS};
use crate::rtree::{
    Node, NodeContent, NodeId, NodeKind, PagedOptions, RTreeConfig, SpatialError, SpatialResult,
};

#[derive(Default)]
struct IoCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

struct PagedInner {
    /// `None` once the storage is closed
    file: Option<File>,
    header: FileHeader,
    cache: RecordCache,
    record_size: usize,
}

/// Node storage over a single file of fixed-size records.
///
/// Branch children are kept as a sibling chain on disk and reassembled
/// into a child list on read. Freed records are chained into a free list
/// that survives reopening.
pub struct PagedStorage {
    inner: Mutex<PagedInner>,
    counters: IoCounters,
    config: RTreeConfig,
    path: PathBuf,
}

impl PagedStorage {
    /// Create a new index file, truncating any existing one
    pub fn create(
        path: impl AsRef<Path>,
        config: &RTreeConfig,
        options: PagedOptions,
    ) -> SpatialResult<Self> {
        config.validate()?;
        let path = path.as_ref();
        let record_size = record_size_for(config.max_fan_out, config.dimensions)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let header = FileHeader::new(config, record_size);
        let mut inner = PagedInner::new(file, header, record_size, &options);
        inner.write_header()?;

        debug!(
            "Created paged storage at {} (record size {} bytes)",
            path.display(),
            record_size
        );
        Ok(Self {
            inner: Mutex::new(inner),
            counters: IoCounters::default(),
            config: config.clone(),
            path: path.to_path_buf(),
        })
    }

    /// Open an existing index file, validating its header
    pub fn open(path: impl AsRef<Path>, options: PagedOptions) -> SpatialResult<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        if file.metadata()?.len() < HEADER_SIZE {
            return Err(SpatialError::InvalidFormat(format!(
                "{} is too short to hold a header",
                path.display()
            )));
        }
        let mut buffer = vec![0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buffer)?;
        let header = decode_header(&buffer)?;

        let expected = record_size_for(header.max_fan_out as usize, header.dimensions as usize)?;
        if header.record_size as usize != expected {
            return Err(SpatialError::InvalidFormat(format!(
                "record size {} does not match fan-out {} and {} dimensions (expected {})",
                header.record_size, header.max_fan_out, header.dimensions, expected
            )));
        }

        let config = RTreeConfig::new(header.max_fan_out as usize, header.dimensions as usize)
            .with_coordinate_system(header.coordinate_system.clone());
        config
            .validate()
            .map_err(|e| SpatialError::InvalidFormat(e.to_string()))?;

        debug!(
            "Opened paged storage at {} ({} elements, {} live records)",
            path.display(),
            header.element_count,
            header.live_records()
        );
        let inner = PagedInner::new(file, header, expected, &options);
        Ok(Self {
            inner: Mutex::new(inner),
            counters: IoCounters::default(),
            config,
            path: path.to_path_buf(),
        })
    }

    /// Tree shape recorded in the file header
    pub fn config(&self) -> &RTreeConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_size(&self) -> usize {
        self.inner.lock().record_size
    }
}

impl PagedInner {
    fn new(file: File, header: FileHeader, record_size: usize, options: &PagedOptions) -> Self {
        let records = (options.buffer_size / record_size).max(MIN_CACHED_RECORDS);
        let capacity = NonZeroUsize::new(records).unwrap_or(NonZeroUsize::MIN);
        Self {
            file: Some(file),
            header,
            cache: RecordCache::new(capacity),
            record_size,
        }
    }

    fn file(&mut self) -> SpatialResult<&mut File> {
        self.file.as_mut().ok_or(SpatialError::Closed)
    }

    fn ensure_open(&self) -> SpatialResult<()> {
        if self.file.is_some() {
            Ok(())
        } else {
            Err(SpatialError::Closed)
        }
    }

    fn offset(&self, id: NodeId) -> SpatialResult<u64> {
        if id == 0 || id >= self.header.next_record {
            return Err(SpatialError::InconsistentState(format!(
                "record handle {} out of range",
                id
            )));
        }
        Ok(HEADER_SIZE + (id - 1) * self.record_size as u64)
    }

    fn write_header(&mut self) -> SpatialResult<()> {
        let bytes = encode_header(&self.header)?;
        let file = self.file()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Read a single record from disk (one seek + one read)
    fn read_raw(&mut self, id: NodeId, counters: &IoCounters) -> SpatialResult<NodeRecord> {
        let offset = self.offset(id)?;
        let mut buffer = vec![0u8; self.record_size];
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer)?;
        counters.disk_reads.fetch_add(1, Ordering::Relaxed);
        decode_record(&buffer)
    }

    fn write_raw(
        &mut self,
        id: NodeId,
        record: &NodeRecord,
        counters: &IoCounters,
    ) -> SpatialResult<()> {
        let offset = self.offset(id)?;
        let bytes = encode_record(record, self.record_size)?;
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&bytes)?;
        counters.disk_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Cache first, then disk.
    fn fetch(&mut self, id: NodeId, counters: &IoCounters) -> SpatialResult<NodeRecord> {
        if let Some(record) = self.cache.get(id) {
            counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(record.clone());
        }

        counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        let record = self.read_raw(id, counters)?;
        self.cache_record(id, record.clone(), false, counters)?;
        Ok(record)
    }

    /// Put a record in the cache. An evicted dirty record is written out.
    fn cache_record(
        &mut self,
        id: NodeId,
        record: NodeRecord,
        dirty: bool,
        counters: &IoCounters,
    ) -> SpatialResult<()> {
        if let Some((evicted, cached)) = self.cache.insert(id, record, dirty) {
            if cached.dirty {
                self.write_raw(evicted, &cached.record, counters)?;
            }
        }
        Ok(())
    }

    fn fetch_live(&mut self, id: NodeId, counters: &IoCounters) -> SpatialResult<NodeRecord> {
        let record = self.fetch(id, counters)?;
        if record.kind == RecordKind::Free {
            return Err(SpatialError::InconsistentState(format!(
                "node handle {} refers to a freed record",
                id
            )));
        }
        Ok(record)
    }

    /// Pops the free list, or extends the file by one record.
    fn allocate(&mut self, counters: &IoCounters) -> SpatialResult<NodeId> {
        let head = self.header.free_list_head;
        if head != 0 {
            let record = self.fetch(head, counters)?;
            if record.kind != RecordKind::Free {
                return Err(SpatialError::InconsistentState(format!(
                    "free list head {} is a live record",
                    head
                )));
            }
            self.header.free_list_head = record.next_sibling;
            self.header.free_records = self.header.free_records.saturating_sub(1);
            trace!("Reusing free record {}", head);
            return Ok(head);
        }

        let id = self.header.next_record;
        self.header.next_record += 1;
        Ok(id)
    }

    /// Rebuilds a node, following the sibling chain of a branch.
    fn load_node(&mut self, id: NodeId, counters: &IoCounters) -> SpatialResult<Node> {
        let record = self.fetch_live(id, counters)?;
        let content = match record.kind {
            RecordKind::Leaf => NodeContent::Leaf {
                entries: record.leaf_entries()?,
            },
            _ => {
                let count = record.child_count as usize;
                let mut children = Vec::with_capacity(count);
                let mut cursor = record.first_child;
                for _ in 0..count {
                    if cursor == 0 {
                        return Err(SpatialError::InconsistentState(format!(
                            "branch {} claims {} children but its sibling chain holds {}",
                            id,
                            count,
                            children.len()
                        )));
                    }
                    children.push(cursor);
                    cursor = self.fetch_live(cursor, counters)?.next_sibling;
                }
                NodeContent::Branch { children }
            }
        };

        Ok(Node {
            id,
            parent: (record.parent != 0).then_some(record.parent),
            bbox: record.bounding_box()?,
            content,
        })
    }

    fn store_node(&mut self, node: &Node, counters: &IoCounters) -> SpatialResult<()> {
        let existing = self.fetch_live(node.id, counters)?;
        let children = node.children();
        let record = NodeRecord {
            kind: node.kind().into(),
            bbox: node
                .bbox
                .as_ref()
                .map(|b| b.coords().to_vec())
                .unwrap_or_default(),
            parent: node.parent.unwrap_or(0),
            first_child: children.first().copied().unwrap_or(0),
            next_sibling: existing.next_sibling,
            child_count: children.len() as u32,
            entries: entry_records(node.entries()),
        };
        self.cache_record(node.id, record, true, counters)?;

        // Relink the chain, touching only children whose link changed
        for (i, &child) in children.iter().enumerate() {
            let next = children.get(i + 1).copied().unwrap_or(0);
            let mut record = self.fetch_live(child, counters)?;
            if record.next_sibling != next {
                record.next_sibling = next;
                self.cache_record(child, record, true, counters)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self, counters: &IoCounters) -> SpatialResult<()> {
        for id in self.cache.dirty_ids() {
            let record = match self.cache.peek(id) {
                Some(cached) => cached.record.clone(),
                None => continue,
            };
            self.write_raw(id, &record, counters)?;
            self.cache.mark_clean(id);
        }
        self.write_header()?;
        self.file()?.sync_all()?;
        Ok(())
    }
}

impl NodeStorage for PagedStorage {
    fn create_node(&mut self, kind: NodeKind, parent: Option<NodeId>) -> SpatialResult<Node> {
        let inner = self.inner.get_mut();
        inner.ensure_open()?;
        let id = inner.allocate(&self.counters)?;
        let node = Node::new(id, kind, parent);
        let record = NodeRecord {
            kind: kind.into(),
            parent: parent.unwrap_or(0),
            ..NodeRecord::free(0)
        };
        inner.cache_record(id, record, true, &self.counters)?;
        Ok(node)
    }

    fn read_node(&self, id: NodeId) -> SpatialResult<Node> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner.load_node(id, &self.counters)
    }

    fn write_node(&mut self, node: &Node) -> SpatialResult<()> {
        let inner = self.inner.get_mut();
        inner.ensure_open()?;
        inner.store_node(node, &self.counters)
    }

    fn free_node(&mut self, id: NodeId) -> SpatialResult<()> {
        let inner = self.inner.get_mut();
        inner.ensure_open()?;
        inner.fetch_live(id, &self.counters)?;
        let record = NodeRecord::free(inner.header.free_list_head);
        inner.cache_record(id, record, true, &self.counters)?;
        inner.header.free_list_head = id;
        inner.header.free_records += 1;
        Ok(())
    }

    fn root(&self) -> Option<NodeId> {
        let root = self.inner.lock().header.root;
        (root != 0).then_some(root)
    }

    fn set_root(&mut self, root: Option<NodeId>) -> SpatialResult<()> {
        let inner = self.inner.get_mut();
        inner.ensure_open()?;
        inner.header.root = root.unwrap_or(0);
        Ok(())
    }

    fn element_count(&self) -> u64 {
        self.inner.lock().header.element_count
    }

    fn set_element_count(&mut self, count: u64) -> SpatialResult<()> {
        let inner = self.inner.get_mut();
        inner.ensure_open()?;
        inner.header.element_count = count;
        Ok(())
    }

    fn clear(&mut self) -> SpatialResult<()> {
        let inner = self.inner.get_mut();
        inner.ensure_open()?;
        inner.cache.clear();
        inner.header = FileHeader::new(&self.config, inner.record_size);
        inner.file()?.set_len(HEADER_SIZE)?;
        inner.write_header()?;
        debug!("Cleared paged storage at {}", self.path.display());
        Ok(())
    }

    fn flush(&mut self) -> SpatialResult<()> {
        let inner = self.inner.get_mut();
        inner.ensure_open()?;
        inner.flush(&self.counters)
    }

    fn close(&mut self) -> SpatialResult<()> {
        let inner = self.inner.get_mut();
        if inner.file.is_none() {
            return Ok(());
        }
        let result = inner.flush(&self.counters);
        inner.file = None;
        inner.cache.clear();
        debug!("Closed paged storage at {}", self.path.display());
        result
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().file.is_none()
    }

    fn stats(&self) -> StorageStats {
        let inner = self.inner.lock();
        StorageStats {
            node_count: inner.header.live_records(),
            cached_records: inner.cache.len() as u64,
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            disk_reads: self.counters.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.counters.disk_writes.load(Ordering::Relaxed),
        }
    }
}

impl Drop for PagedStorage {
    fn drop(&mut self) {
        // Best effort flush on drop
        if let Err(e) = self.close() {
            warn!("Failed to close paged storage {}: {}", self.path.display(), e);
        }
    }
}
