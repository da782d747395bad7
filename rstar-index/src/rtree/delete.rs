//! Deletion engine.
//!
//! After an entry is removed, the path back to the root is condensed: a
//! child that became empty is dropped, and a child that fell below the fill
//! minimum (or a branch left with a single child) is dissolved, its entries
//! set aside. A root left with a single child is replaced by that child.
//! Set-aside entries are inserted again from the root once the path is
//! repaired, which keeps all leaves at the same depth.

use log::{debug, trace};

use super::insert::ReinsertBudget;
use super::rtree_impl::RTree;
use super::rtree_types::{Entry, Node, NodeContent, NodeId, SpatialResult};
use crate::storage::NodeStorage;

impl<S: NodeStorage> RTree<S> {
    /// Remove an entry matching both box and identifier.
    ///
    /// Returns `false` if no such entry is indexed; that is not an error.
    pub fn remove(&mut self, entry: &Entry) -> SpatialResult<bool> {
        self.check_open()?;
        entry.bbox.check_valid(self.config.dimensions)?;

        let root = match self.storage.root() {
            Some(root) => self.storage.read_node(root)?,
            None => return Ok(false),
        };
        if !root.bbox.as_ref().is_some_and(|b| b.contains(&entry.bbox)) {
            return Ok(false);
        }

        let root_id = root.id;
        let mut orphans = Vec::new();
        if !self.remove_from(root, entry, &mut orphans)? {
            return Ok(false);
        }

        let count = self.storage.element_count().saturating_sub(1);
        self.storage.set_element_count(count)?;

        self.shrink_root(root_id)?;

        if !orphans.is_empty() {
            trace!("Reinserting {} entries from condensed nodes", orphans.len());
            let mut budget = ReinsertBudget::spent();
            for orphan in orphans {
                self.insert_entry(orphan, &mut budget)?;
            }
        }
        Ok(true)
    }

    /// Release an empty root, and replace a branch root that is left with a
    /// single child by that child, as often as needed.
    fn shrink_root(&mut self, mut root_id: NodeId) -> SpatialResult<()> {
        loop {
            let root = self.storage.read_node(root_id)?;
            if root.is_empty() {
                self.storage.free_node(root_id)?;
                self.storage.set_root(None)?;
                debug!("Tree emptied; released root {}", root_id);
                return Ok(());
            }
            let only_child = match root.children() {
                [child] => *child,
                _ => return Ok(()),
            };

            let mut child = self.storage.read_node(only_child)?;
            child.parent = None;
            self.storage.write_node(&child)?;
            self.storage.set_root(Some(only_child))?;
            self.storage.free_node(root_id)?;
            trace!("Root {} collapsed into its only child {}", root_id, only_child);
            root_id = only_child;
        }
    }

    /// Remove `entry` from the subtree under `node`, condensing on the way
    /// back up. Returns whether the entry was found.
    fn remove_from(
        &mut self,
        mut node: Node,
        entry: &Entry,
        orphans: &mut Vec<Entry>,
    ) -> SpatialResult<bool> {
        if let NodeContent::Leaf { entries } = &mut node.content {
            let Some(pos) = entries.iter().position(|e| e == entry) else {
                return Ok(false);
            };
            entries.remove(pos);
            node.recompute_leaf_bbox();
            self.storage.write_node(&node)?;
            return Ok(true);
        }

        let children = node.children().to_vec();
        for child_id in children {
            let child = self.storage.read_node(child_id)?;
            if !child.bbox.as_ref().is_some_and(|b| b.contains(&entry.bbox)) {
                continue;
            }
            if !self.remove_from(child, entry, orphans)? {
                continue;
            }

            self.condense_child(&mut node, child_id, orphans)?;
            self.refresh_bbox(&mut node)?;
            self.storage.write_node(&node)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop or dissolve `child_id` if the removal left it degenerate.
    fn condense_child(
        &mut self,
        node: &mut Node,
        child_id: NodeId,
        orphans: &mut Vec<Entry>,
    ) -> SpatialResult<()> {
        let child = self.storage.read_node(child_id)?;
        let single_child_branch = !child.is_leaf() && child.len() == 1;
        if !child.is_empty() && !single_child_branch && child.len() >= self.config.min_children() {
            return Ok(());
        }

        if let NodeContent::Branch { children } = &mut node.content {
            children.retain(|&c| c != child_id);
        }
        if child.is_empty() {
            self.storage.free_node(child_id)?;
        } else {
            self.dissolve(child, orphans)?;
        }
        self.counters.condensed_nodes += 1;
        trace!("Condensed node {} under {}", child_id, node.id);
        Ok(())
    }

    /// Free a whole subtree, collecting its entries.
    fn dissolve(&mut self, node: Node, orphans: &mut Vec<Entry>) -> SpatialResult<()> {
        let id = node.id;
        match node.content {
            NodeContent::Leaf { entries } => orphans.extend(entries),
            NodeContent::Branch { children } => {
                for child in children {
                    let child = self.storage.read_node(child)?;
                    self.dissolve(child, orphans)?;
                }
            }
        }
        self.storage.free_node(id)
    }
}
