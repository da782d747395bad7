//! # rstar-index - a disk-capable R*-Tree
//!
//! A spatial index over D-dimensional axis-aligned boxes. Every entry is a
//! box plus an integer identifier that the caller maps back to its own data.
//!
//! ## Features
//!
//! - **R\* insertion**: overlap-aware subtree choice and forced reinsertion
//! - **R\* splits**: axis chosen by summed cost, distribution by least overlap
//! - **Branch grafting**: redistributes overlapping sibling leaves after splits
//! - **Condensing deletes**: underfull nodes are dissolved and their entries
//!   reinserted, so leaves stay at one depth
//! - **Visitor search**: early termination and subtree/sibling skipping
//! - **Two storage backends**: an in-memory arena and a paged file with an
//!   LRU record cache, checksummed records and a persistent free list
//! - **Nearest neighbours**: branch-and-bound k-nearest queries
//!
//! ## Quick Start
//!
//! ```rust
//! use rstar_index::{BoundingBox, Entry, RTree, RTreeConfig};
//!
//! # fn main() -> Result<(), rstar_index::SpatialError> {
//! let mut tree = RTree::in_memory(RTreeConfig::new(8, 2))?;
//! tree.insert(Entry::new(BoundingBox::rect(0.0, 0.0, 10.0, 10.0), 1))?;
//! tree.insert(Entry::new(BoundingBox::rect(20.0, 20.0, 30.0, 30.0), 2))?;
//!
//! let hits = tree.find_intersecting(&BoundingBox::rect(5.0, 5.0, 15.0, 15.0))?;
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].id, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## File-backed trees
//!
//! ```rust,no_run
//! use rstar_index::{BoundingBox, Entry, RTree, RTreeConfig, VisitResult};
//!
//! # fn main() -> Result<(), rstar_index::SpatialError> {
//! let mut tree = RTree::create("places.rtree", RTreeConfig::new(16, 2))?;
//! tree.insert(Entry::new(BoundingBox::point(&[4.0, 2.0]), 7))?;
//! tree.close()?;
//!
//! let tree = RTree::open("places.rtree")?;
//! tree.search(None, &mut |entry: &Entry| {
//!     println!("{} at {}", entry.id, entry.bbox);
//!     VisitResult::Continue
//! })?;
//! # Ok(())
//! # }
//! ```

// Geometry
pub mod bounding_box;
pub mod calculator;
pub mod hilbert;

// Tree engine and storage
pub mod rtree;
pub mod storage;

// Caller-facing adapters
pub mod mapper;

pub use bounding_box::BoundingBox;
pub use calculator::{calculator_for, BoxCalculator, PerimeterCalculator, VolumeCalculator};
pub use mapper::{ElementMapper, MappedRTree};
pub use rtree::{
    ElementId, Entry, IntegrityReport, Node, NodeContent, NodeId, NodeKind, PagedOptions, RTree,
    RTreeConfig, RTreeStats, SpatialError, SpatialResult, TreeVisitor, VisitResult,
};
pub use storage::{MemoryStorage, NodeStorage, PagedStorage, StorageStats};
