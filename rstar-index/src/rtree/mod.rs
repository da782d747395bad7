//! R*-Tree engine.
//!
//! Nodes are never held by reference inside the tree: every algorithm goes
//! through a [`NodeStorage`](crate::storage::NodeStorage) by handle, which is
//! what lets the same code run over memory and over a paged file.
//!
//! - Insertion with R* subtree choice and forced reinsertion
//! - Overlap-minimizing R* splits
//! - Branch grafting between overlapping sibling leaves
//! - Deletion with condensation and orphan reinsertion
//! - Visitor-controlled search and k-nearest-neighbour queries

mod delete;
mod graft;
mod insert;
mod nearest;
mod rtree_config;
pub mod rtree_constants;
mod rtree_impl;
mod rtree_types;
mod split;
mod visitor;

pub use rtree_config::{PagedOptions, RTreeConfig};
pub use rtree_impl::RTree;
pub use rtree_types::{
    ElementId, Entry, IntegrityReport, Node, NodeContent, NodeId, NodeKind, RTreeStats,
    SpatialError, SpatialResult,
};
pub use visitor::{TreeVisitor, VisitResult};
