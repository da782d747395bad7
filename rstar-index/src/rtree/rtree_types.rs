//! Core types and data structures for the R*-Tree.
//!
//! This module defines the fundamental types used throughout the tree:
//! - Error types and result types
//! - Entries and nodes (Leaf and Branch)
//! - Statistics and integrity report structures

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounding_box::BoundingBox;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Inconsistent tree state: {0}")]
    InconsistentState(String),

    #[error("Tree is closed")]
    Closed,
}

impl SpatialError {
    /// True for failures raised by the storage layer (I/O, encoding, foreign
    /// or corrupt files). The index must be abandoned or reopened after one.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            SpatialError::Io(_) | SpatialError::Serialization(_) | SpatialError::InvalidFormat(_)
        )
    }
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Opaque payload identifier, resolved by the caller's element mapper.
pub type ElementId = u64;

/// Handle of a node in its storage. Zero is never a live handle.
pub type NodeId = u64;

// ============================================================================
// Entries and Nodes
// ============================================================================

/// An indexed item: a bounding box plus the caller's payload identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub bbox: BoundingBox,
    pub id: ElementId,
}

impl Entry {
    pub fn new(bbox: BoundingBox, id: ElementId) -> Self {
        Self { bbox, id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Leaf,
    Branch,
}

/// What a node holds: entries at the leaf level, child handles above it.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Leaf { entries: Vec<Entry> },
    Branch { children: Vec<NodeId> },
}

/// The structural unit of the tree.
///
/// `bbox` is the exact union of the node's entries or of its children's
/// boxes, and is `None` only while the node is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub bbox: Option<BoundingBox>,
    pub content: NodeContent,
}

impl Node {
    /// An empty node of the given kind.
    pub fn new(id: NodeId, kind: NodeKind, parent: Option<NodeId>) -> Self {
        let content = match kind {
            NodeKind::Leaf => NodeContent::Leaf {
                entries: Vec::new(),
            },
            NodeKind::Branch => NodeContent::Branch {
                children: Vec::new(),
            },
        };
        Self {
            id,
            parent,
            bbox: None,
            content,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.content {
            NodeContent::Leaf { .. } => NodeKind::Leaf,
            NodeContent::Branch { .. } => NodeKind::Branch,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.content, NodeContent::Leaf { .. })
    }

    /// Number of entries (leaf) or children (branch).
    pub fn len(&self) -> usize {
        match &self.content {
            NodeContent::Leaf { entries } => entries.len(),
            NodeContent::Branch { children } => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Leaf entries; empty for branches.
    pub fn entries(&self) -> &[Entry] {
        match &self.content {
            NodeContent::Leaf { entries } => entries,
            NodeContent::Branch { .. } => &[],
        }
    }

    /// Child handles; empty for leaves.
    pub fn children(&self) -> &[NodeId] {
        match &self.content {
            NodeContent::Leaf { .. } => &[],
            NodeContent::Branch { children } => children,
        }
    }

    /// Recompute a leaf's box from its entries. Branch boxes depend on the
    /// children's stored boxes and are recomputed by the engine.
    pub fn recompute_leaf_bbox(&mut self) {
        if let NodeContent::Leaf { entries } = &self.content {
            self.bbox = BoundingBox::union_all(entries.iter().map(|e| &e.bbox));
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics about R-Tree structure and operations
#[derive(Debug, Clone, Default)]
pub struct RTreeStats {
    pub total_entries: u64,
    pub node_count: u64,
    pub tree_height: u32,
    pub splits: u64,
    pub forced_reinsertions: u64,
    pub grafts: u64,
    pub condensed_nodes: u64,
    pub cached_records: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

/// Result of a structural integrity check
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Total nodes visited
    pub nodes_checked: u64,
    /// Entries reachable from the root
    pub entries_found: u64,
    /// Depth of the leaves (0 for an empty tree)
    pub height: u32,
    /// Summary of findings
    pub is_valid: bool,
    /// Detailed error messages
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            nodes_checked: 0,
            entries_found: 0,
            height: 0,
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.is_valid = false;
        self.errors.push(message);
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}
