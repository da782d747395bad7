//! Node storage for the R*-Tree.
//!
//! The tree never holds node payloads across operations; it reads, mutates
//! and writes nodes back through [`NodeStorage`]. Two backends implement the
//! contract:
//! - [`MemoryStorage`] keeps nodes in a slot arena
//! - [`PagedStorage`] keeps fixed-size records in a file behind an LRU cache
//!
//! Both return the most recent write for a handle; neither lets a cached
//! record outlive a write to the same handle.

mod memory_storage;
mod paged_storage;
mod record_cache;
mod record_codec;

pub use memory_storage::MemoryStorage;
pub use paged_storage::PagedStorage;

use crate::rtree::{Node, NodeId, NodeKind, SpatialResult};

/// Counters reported by a storage backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub node_count: u64,
    pub cached_records: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

/// Allocates, reads, writes and frees tree nodes.
///
/// Implementations are single-writer: mutating methods take `&mut self`,
/// while `read_node` takes `&self` so that searches can share the storage.
pub trait NodeStorage: Send + Sync {
    /// Allocates a handle and returns an empty node of `kind` stored under it.
    fn create_node(&mut self, kind: NodeKind, parent: Option<NodeId>) -> SpatialResult<Node>;

    /// Reads the latest written state of a node.
    fn read_node(&self, id: NodeId) -> SpatialResult<Node>;

    /// Persists every field of `node` under `node.id`.
    fn write_node(&mut self, node: &Node) -> SpatialResult<()>;

    /// Releases a handle for reuse.
    fn free_node(&mut self, id: NodeId) -> SpatialResult<()>;

    fn root(&self) -> Option<NodeId>;

    fn set_root(&mut self, root: Option<NodeId>) -> SpatialResult<()>;

    fn element_count(&self) -> u64;

    fn set_element_count(&mut self, count: u64) -> SpatialResult<()>;

    /// Drops every node and resets root and element count.
    fn clear(&mut self) -> SpatialResult<()>;

    /// Pushes pending writes to the backing medium.
    fn flush(&mut self) -> SpatialResult<()>;

    /// Flushes and releases underlying resources. Calling it again is a no-op.
    fn close(&mut self) -> SpatialResult<()>;

    fn is_closed(&self) -> bool;

    fn stats(&self) -> StorageStats;
}
