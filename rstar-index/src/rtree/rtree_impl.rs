//! RTree facade: construction, lifecycle, statistics and integrity checks.
//!
//! The structural algorithms live in sibling modules as further `impl`
//! blocks of [`RTree`]:
//! - `insert`: subtree choice, forced reinsertion and overflow handling
//! - `split`: R* axis and distribution selection
//! - `graft`: redistribution between overlapping sibling leaves
//! - `delete`: removal and condensation
//! - `visitor`: visitor-driven search
//! - `nearest`: k-nearest-neighbour queries

use std::cmp::Ordering;
use std::path::Path;

use log::debug;

use super::rtree_config::{PagedOptions, RTreeConfig};
use super::rtree_types::{
    Entry, IntegrityReport, Node, NodeId, RTreeStats, SpatialError, SpatialResult,
};
use crate::bounding_box::BoundingBox;
use crate::calculator::{calculator_for, BoxCalculator};
use crate::hilbert::hilbert_key;
use crate::storage::{MemoryStorage, NodeStorage, PagedStorage};

/// Structural event counters for the current session
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct OpCounters {
    pub splits: u64,
    pub forced_reinsertions: u64,
    pub grafts: u64,
    pub condensed_nodes: u64,
}

/// An R*-Tree over a pluggable node storage.
///
/// All algorithms read and write nodes exclusively through the storage, so
/// the in-memory and file-backed variants share every line of tree logic.
///
/// The tree is single-writer: mutations take `&mut self`, searches take
/// `&self`.
///
/// ```rust
/// use rstar_index::{BoundingBox, Entry, RTree, RTreeConfig};
///
/// let mut tree = RTree::in_memory(RTreeConfig::new(4, 2)).unwrap();
/// for i in 0..10 {
///     let x = i as f64;
///     tree.insert(Entry::new(BoundingBox::rect(x, x, x + 1.0, x + 1.0), i)).unwrap();
/// }
///
/// let hits = tree.find_intersecting(&BoundingBox::rect(1.5, 1.5, 3.5, 3.5)).unwrap();
/// assert_eq!(hits.len(), 3);
/// ```
pub struct RTree<S: NodeStorage = MemoryStorage> {
    pub(super) storage: S,
    pub(super) config: RTreeConfig,
    pub(super) calculator: Box<dyn BoxCalculator>,
    pub(super) counters: OpCounters,
}

impl RTree<MemoryStorage> {
    /// Create an empty tree held entirely in memory
    pub fn in_memory(config: RTreeConfig) -> SpatialResult<Self> {
        Self::with_storage(MemoryStorage::new(), config)
    }
}

impl RTree<PagedStorage> {
    /// Create a new file-backed tree at `path`, truncating any existing file.
    pub fn create(path: impl AsRef<Path>, config: RTreeConfig) -> SpatialResult<Self> {
        Self::create_with_options(path, config, PagedOptions::default())
    }

    pub fn create_with_options(
        path: impl AsRef<Path>,
        config: RTreeConfig,
        options: PagedOptions,
    ) -> SpatialResult<Self> {
        let storage = PagedStorage::create(path, &config, options)?;
        Self::with_storage(storage, config)
    }

    /// Open an existing file-backed tree.
    ///
    /// Fan-out, dimensionality and coordinate system come from the file
    /// header; the insertion heuristics take their default values.
    pub fn open(path: impl AsRef<Path>) -> SpatialResult<Self> {
        Self::open_with_options(path, PagedOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: PagedOptions) -> SpatialResult<Self> {
        let storage = PagedStorage::open(path, options)?;
        let config = storage.config().clone();
        Self::with_storage(storage, config)
    }
}

impl<S: NodeStorage> RTree<S> {
    /// Build a tree over an arbitrary storage backend.
    pub fn with_storage(storage: S, config: RTreeConfig) -> SpatialResult<Self> {
        config.validate()?;
        let calculator = calculator_for(config.dimensions);
        debug!(
            "Opened R*-tree (M = {}, {} dimensions, {} cost, {} elements)",
            config.max_fan_out,
            config.dimensions,
            calculator.name(),
            storage.element_count()
        );
        Ok(Self {
            storage,
            config,
            calculator,
            counters: OpCounters::default(),
        })
    }

    pub fn config(&self) -> &RTreeConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Number of indexed entries
    pub fn len(&self) -> u64 {
        self.storage.element_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.storage.is_closed()
    }

    /// Number of levels; 0 for an empty tree, 1 for a lone root leaf.
    pub fn height(&self) -> SpatialResult<u32> {
        self.check_open()?;
        let mut height = 0;
        let mut cursor = self.storage.root();
        while let Some(id) = cursor {
            let node = self.storage.read_node(id)?;
            height += 1;
            cursor = node.children().first().copied();
        }
        Ok(height)
    }

    /// Insert a batch of entries.
    ///
    /// Every box is validated before the first insertion. Two-dimensional
    /// batches are inserted in Hilbert order of their centroids, higher
    /// dimensions in lexicographic centroid order.
    pub fn bulk_insert<I>(&mut self, entries: I) -> SpatialResult<()>
    where
        I: IntoIterator<Item = Entry>,
    {
        self.check_open()?;
        let mut entries: Vec<Entry> = entries.into_iter().collect();
        for entry in &entries {
            entry.bbox.check_valid(self.config.dimensions)?;
        }

        if self.config.dimensions == 2 {
            if let Some(bounds) = BoundingBox::union_all(entries.iter().map(|e| &e.bbox)) {
                entries.sort_by_cached_key(|e| hilbert_key(&e.bbox.centroid(), &bounds));
            }
        } else {
            entries.sort_by(|a, b| {
                let (ca, cb) = (a.bbox.centroid(), b.bbox.centroid());
                ca.iter()
                    .zip(cb.iter())
                    .map(|(x, y)| x.total_cmp(y))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        debug!("Bulk inserting {} entries", entries.len());
        for entry in entries {
            self.insert(entry)?;
        }
        Ok(())
    }

    /// Remove every entry
    pub fn clear(&mut self) -> SpatialResult<()> {
        self.check_open()?;
        self.storage.clear()?;
        debug!("Cleared R*-tree");
        Ok(())
    }

    /// Flush pending writes to the storage medium
    pub fn flush(&mut self) -> SpatialResult<()> {
        self.check_open()?;
        self.storage.flush()
    }

    /// Flush and release the storage. Closing twice is a no-op.
    pub fn close(&mut self) -> SpatialResult<()> {
        if self.storage.is_closed() {
            return Ok(());
        }
        debug!(
            "Closing R*-tree ({} elements, {} splits, {} forced reinsertions)",
            self.storage.element_count(),
            self.counters.splits,
            self.counters.forced_reinsertions
        );
        self.storage.close()
    }

    pub fn stats(&self) -> SpatialResult<RTreeStats> {
        let height = self.height()?;
        let storage = self.storage.stats();
        Ok(RTreeStats {
            total_entries: self.storage.element_count(),
            node_count: storage.node_count,
            tree_height: height,
            splits: self.counters.splits,
            forced_reinsertions: self.counters.forced_reinsertions,
            grafts: self.counters.grafts,
            condensed_nodes: self.counters.condensed_nodes,
            cached_records: storage.cached_records,
            cache_hits: storage.cache_hits,
            cache_misses: storage.cache_misses,
            disk_reads: storage.disk_reads,
            disk_writes: storage.disk_writes,
        })
    }

    /// Walk the whole tree and verify its structural invariants:
    /// - node boxes are the exact union of their contents
    /// - parent links point at the enclosing node
    /// - all leaves sit at the same depth
    /// - non-root nodes hold between `min_children` and `M` items
    /// - the stored element count matches the reachable entries
    ///
    /// Storage failures abort the walk; every other finding is recorded in
    /// the report.
    pub fn check_integrity(&self) -> SpatialResult<IntegrityReport> {
        self.check_open()?;
        let mut report = IntegrityReport::new();
        let mut leaf_depth = None;

        if let Some(root) = self.storage.root() {
            self.check_node(root, None, 1, &mut leaf_depth, &mut report)?;
        }
        report.height = leaf_depth.unwrap_or(0);

        let expected = self.storage.element_count();
        if report.entries_found != expected {
            report.fail(format!(
                "element count is {} but {} entries are reachable",
                expected, report.entries_found
            ));
        }
        Ok(report)
    }

    fn check_node(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
        depth: u32,
        leaf_depth: &mut Option<u32>,
        report: &mut IntegrityReport,
    ) -> SpatialResult<()> {
        let node = match self.storage.read_node(id) {
            Ok(node) => node,
            Err(e) if e.is_storage_failure() => return Err(e),
            Err(e) => {
                report.fail(format!("node {} unreadable: {}", id, e));
                return Ok(());
            }
        };
        report.nodes_checked += 1;

        if node.parent != parent {
            report.fail(format!(
                "node {} has parent {:?}, expected {:?}",
                id, node.parent, parent
            ));
        }
        if node.len() > self.config.max_fan_out {
            report.fail(format!(
                "node {} holds {} items (max {})",
                id,
                node.len(),
                self.config.max_fan_out
            ));
        }
        if parent.is_some() && node.len() < self.config.min_children() {
            report.fail(format!(
                "node {} holds {} items (min {})",
                id,
                node.len(),
                self.config.min_children()
            ));
        }
        if node.is_empty() {
            report.fail(format!("node {} is empty", id));
        }

        let actual = if node.is_leaf() {
            for entry in node.entries() {
                if entry.bbox.dimensions() != self.config.dimensions {
                    report.fail(format!("entry {} in node {} has wrong dimensions", entry.id, id));
                }
            }
            report.entries_found += node.len() as u64;
            match leaf_depth {
                Some(d) if *d != depth => report.fail(format!(
                    "leaf {} at depth {}, other leaves at depth {}",
                    id, depth, d
                )),
                Some(_) => {}
                None => *leaf_depth = Some(depth),
            }
            BoundingBox::union_all(node.entries().iter().map(|e| &e.bbox))
        } else {
            let mut boxes = Vec::with_capacity(node.len());
            for &child in node.children() {
                self.check_node(child, Some(id), depth + 1, leaf_depth, report)?;
                if let Ok(child) = self.storage.read_node(child) {
                    boxes.extend(child.bbox);
                }
            }
            BoundingBox::union_all(boxes.iter())
        };

        if node.bbox != actual {
            report.fail(format!(
                "node {} box {:?} differs from the union of its contents {:?}",
                id, node.bbox, actual
            ));
        }
        Ok(())
    }

    pub(super) fn check_open(&self) -> SpatialResult<()> {
        if self.storage.is_closed() {
            Err(SpatialError::Closed)
        } else {
            Ok(())
        }
    }

    pub(super) fn node_box<'a>(&self, node: &'a Node) -> SpatialResult<&'a BoundingBox> {
        node.bbox.as_ref().ok_or_else(|| {
            SpatialError::InconsistentState(format!("node {} has no bounding box", node.id))
        })
    }

    /// Recompute a node's box from its entries or its children's stored boxes.
    pub(super) fn refresh_bbox(&self, node: &mut Node) -> SpatialResult<()> {
        if node.is_leaf() {
            node.recompute_leaf_bbox();
            return Ok(());
        }
        let mut bbox: Option<BoundingBox> = None;
        for &child in node.children() {
            let child = self.storage.read_node(child)?;
            let child_box = self.node_box(&child)?;
            match &mut bbox {
                Some(b) => b.expand(child_box),
                None => bbox = Some(child_box.clone()),
            }
        }
        node.bbox = bbox;
        Ok(())
    }

    /// Point a node's parent link at `parent`.
    pub(super) fn reparent(&mut self, id: NodeId, parent: NodeId) -> SpatialResult<()> {
        let mut node = self.storage.read_node(id)?;
        if node.parent != Some(parent) {
            node.parent = Some(parent);
            self.storage.write_node(&node)?;
        }
        Ok(())
    }
}
