//! In-memory node storage backed by a slot arena.

use super::{NodeStorage, StorageStats};
use crate::rtree::{Node, NodeId, NodeKind, SpatialError, SpatialResult};

/// Keeps nodes in a `Vec` of slots; a handle is its slot index plus one.
///
/// Freed slots are recycled before the arena grows.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Vec<Option<Node>>,
    free_slots: Vec<usize>,
    root: Option<NodeId>,
    element_count: u64,
    closed: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_closed(&self) -> SpatialResult<()> {
        if self.closed {
            Err(SpatialError::Closed)
        } else {
            Ok(())
        }
    }

    fn slot_of(&self, id: NodeId) -> SpatialResult<usize> {
        let slot = id
            .checked_sub(1)
            .map(|s| s as usize)
            .filter(|s| matches!(self.slots.get(*s), Some(Some(_))));
        slot.ok_or_else(|| SpatialError::InconsistentState(format!("dangling node handle {}", id)))
    }
}

impl NodeStorage for MemoryStorage {
    fn create_node(&mut self, kind: NodeKind, parent: Option<NodeId>) -> SpatialResult<Node> {
        self.check_closed()?;
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let node = Node::new(slot as NodeId + 1, kind, parent);
        self.slots[slot] = Some(node.clone());
        Ok(node)
    }

    fn read_node(&self, id: NodeId) -> SpatialResult<Node> {
        self.check_closed()?;
        let slot = self.slot_of(id)?;
        self.slots[slot]
            .clone()
            .ok_or_else(|| SpatialError::InconsistentState(format!("dangling node handle {}", id)))
    }

    fn write_node(&mut self, node: &Node) -> SpatialResult<()> {
        self.check_closed()?;
        let slot = self.slot_of(node.id)?;
        self.slots[slot] = Some(node.clone());
        Ok(())
    }

    fn free_node(&mut self, id: NodeId) -> SpatialResult<()> {
        self.check_closed()?;
        let slot = self.slot_of(id)?;
        self.slots[slot] = None;
        self.free_slots.push(slot);
        Ok(())
    }

    fn root(&self) -> Option<NodeId> {
        self.root
    }

    fn set_root(&mut self, root: Option<NodeId>) -> SpatialResult<()> {
        self.check_closed()?;
        self.root = root;
        Ok(())
    }

    fn element_count(&self) -> u64 {
        self.element_count
    }

    fn set_element_count(&mut self, count: u64) -> SpatialResult<()> {
        self.check_closed()?;
        self.element_count = count;
        Ok(())
    }

    fn clear(&mut self) -> SpatialResult<()> {
        self.check_closed()?;
        self.slots.clear();
        self.free_slots.clear();
        self.root = None;
        self.element_count = 0;
        Ok(())
    }

    fn flush(&mut self) -> SpatialResult<()> {
        self.check_closed()
    }

    fn close(&mut self) -> SpatialResult<()> {
        if !self.closed {
            self.slots = Vec::new();
            self.free_slots = Vec::new();
            self.closed = true;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn stats(&self) -> StorageStats {
        StorageStats {
            node_count: (self.slots.len() - self.free_slots.len()) as u64,
            ..StorageStats::default()
        }
    }
}
