//! Insertion engine.
//!
//! Insertion descends recursively from the root. Each level reports what
//! happened below it through [`InsertOutcome`], so boxes are repaired on the
//! way back up and overflow is resolved one level at a time.

use log::trace;

use super::rtree_impl::RTree;
use super::rtree_types::{
    Entry, Node, NodeContent, NodeId, NodeKind, SpatialError, SpatialResult,
};
use super::split::split_items;
use crate::bounding_box::BoundingBox;
use crate::storage::NodeStorage;

/// Forced reinsertion may be used at most once per top-level insertion.
#[derive(Debug, Clone, Copy)]
pub(super) struct ReinsertBudget {
    available: bool,
}

impl ReinsertBudget {
    pub fn fresh() -> Self {
        Self { available: true }
    }

    pub fn spent() -> Self {
        Self { available: false }
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn spend(&mut self) {
        self.available = false;
    }
}

pub(super) enum InsertOutcome {
    /// The subtree absorbed the entry without structural change
    Fit,
    /// The node split; `sibling` must be added to its parent
    Split { sibling: NodeId },
    /// Entries were evicted below and must be inserted again from the root
    Reinsert(Vec<Entry>),
}

impl<S: NodeStorage> RTree<S> {
    /// Insert an entry.
    ///
    /// # Errors
    /// [`SpatialError::InvalidArgument`] if the box does not have the tree's
    /// dimensionality. Nothing is modified in that case.
    pub fn insert(&mut self, entry: Entry) -> SpatialResult<()> {
        self.check_open()?;
        entry.bbox.check_valid(self.config.dimensions)?;

        let mut budget = ReinsertBudget::fresh();
        self.insert_entry(entry, &mut budget)?;

        let count = self.storage.element_count() + 1;
        self.storage.set_element_count(count)
    }

    /// Insert from the root, growing the tree if the root splits. Does not
    /// touch the element count.
    pub(super) fn insert_entry(
        &mut self,
        entry: Entry,
        budget: &mut ReinsertBudget,
    ) -> SpatialResult<()> {
        let root = match self.storage.root() {
            Some(root) => self.storage.read_node(root)?,
            None => {
                let mut leaf = self.storage.create_node(NodeKind::Leaf, None)?;
                leaf.bbox = Some(entry.bbox.clone());
                leaf.content = NodeContent::Leaf {
                    entries: vec![entry],
                };
                self.storage.write_node(&leaf)?;
                return self.storage.set_root(Some(leaf.id));
            }
        };

        let root_id = root.id;
        match self.insert_at(root, entry, budget)? {
            InsertOutcome::Fit => Ok(()),
            InsertOutcome::Split { sibling } => self.grow_root(root_id, sibling),
            InsertOutcome::Reinsert(evicted) => {
                trace!("Reinserting {} evicted entries", evicted.len());
                for entry in evicted {
                    self.insert_entry(entry, budget)?;
                }
                Ok(())
            }
        }
    }

    fn insert_at(
        &mut self,
        mut node: Node,
        entry: Entry,
        budget: &mut ReinsertBudget,
    ) -> SpatialResult<InsertOutcome> {
        if node.is_leaf() {
            return self.insert_into_leaf(node, entry, budget);
        }

        let entry_box = entry.bbox.clone();
        let child = self.choose_subtree(&node, &entry_box)?;
        let child_id = child.id;
        let child_is_leaf = child.is_leaf();

        match self.insert_at(child, entry, budget)? {
            InsertOutcome::Fit => {
                match &mut node.bbox {
                    Some(b) => b.expand(&entry_box),
                    None => node.bbox = Some(entry_box),
                }
                self.storage.write_node(&node)?;
                Ok(InsertOutcome::Fit)
            }
            InsertOutcome::Reinsert(evicted) => {
                self.refresh_bbox(&mut node)?;
                self.storage.write_node(&node)?;
                Ok(InsertOutcome::Reinsert(evicted))
            }
            InsertOutcome::Split { sibling } => {
                if let NodeContent::Branch { children } = &mut node.content {
                    let at = children
                        .iter()
                        .position(|&c| c == child_id)
                        .map_or(children.len(), |p| p + 1);
                    children.insert(at, sibling);
                }
                if child_is_leaf && self.config.branch_grafting {
                    self.graft_after_split(node.children(), [child_id, sibling])?;
                }

                if node.len() > self.config.max_fan_out {
                    let sibling = self.split_node(node)?;
                    return Ok(InsertOutcome::Split { sibling });
                }
                self.refresh_bbox(&mut node)?;
                self.storage.write_node(&node)?;
                Ok(InsertOutcome::Fit)
            }
        }
    }

    fn insert_into_leaf(
        &mut self,
        mut node: Node,
        entry: Entry,
        budget: &mut ReinsertBudget,
    ) -> SpatialResult<InsertOutcome> {
        match &mut node.bbox {
            Some(b) => b.expand(&entry.bbox),
            None => node.bbox = Some(entry.bbox.clone()),
        }
        if let NodeContent::Leaf { entries } = &mut node.content {
            entries.push(entry);
        }

        if node.len() <= self.config.max_fan_out {
            self.storage.write_node(&node)?;
            return Ok(InsertOutcome::Fit);
        }

        if node.parent.is_some() && budget.is_available() {
            let evicted = self.evict_for_reinsertion(&mut node)?;
            if !evicted.is_empty() {
                budget.spend();
                self.counters.forced_reinsertions += 1;
                trace!(
                    "Forced reinsertion of {} entries from leaf {}",
                    evicted.len(),
                    node.id
                );
                self.storage.write_node(&node)?;
                return Ok(InsertOutcome::Reinsert(evicted));
            }
        }

        let sibling = self.split_node(node)?;
        Ok(InsertOutcome::Split { sibling })
    }

    /// Pick the child of `node` to descend into for an entry with box `bbox`.
    fn choose_subtree(&self, node: &Node, bbox: &BoundingBox) -> SpatialResult<Node> {
        let mut children = Vec::with_capacity(node.len());
        for &id in node.children() {
            children.push(self.storage.read_node(id)?);
        }
        if children.is_empty() {
            return Err(SpatialError::InconsistentState(format!(
                "branch {} has no children",
                node.id
            )));
        }
        let boxes = children
            .iter()
            .map(|c| self.node_box(c).cloned())
            .collect::<SpatialResult<Vec<_>>>()?;
        let calc = self.calculator.as_ref();

        // A child that already covers the box needs no enlargement
        let containing = (0..children.len())
            .filter(|&i| boxes[i].contains(bbox))
            .min_by(|&a, &b| {
                calc.cost(&boxes[a])
                    .total_cmp(&calc.cost(&boxes[b]))
                    .then(children[a].len().cmp(&children[b].len()))
            });

        let chosen = match containing {
            Some(i) => i,
            None if children[0].is_leaf() => {
                let score = |i: usize| {
                    let enlarged = boxes[i].union(bbox);
                    let overlap: f64 = boxes
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, other)| calc.overlap(&enlarged, other))
                        .sum();
                    (overlap, children[i].len(), calc.cost(&enlarged))
                };
                (0..children.len())
                    .map(|i| (i, score(i)))
                    .min_by(|(_, a), (_, b)| {
                        a.0.total_cmp(&b.0)
                            .then(a.1.cmp(&b.1))
                            .then(a.2.total_cmp(&b.2))
                    })
                    .map_or(0, |(i, _)| i)
            }
            None => (0..children.len())
                .map(|i| (i, calc.enlargement(&boxes[i], bbox), children[i].len()))
                .min_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)))
                .map_or(0, |(i, _, _)| i),
        };

        Ok(children.swap_remove(chosen))
    }

    /// Remove the entries lying farthest from the leaf's centre, returning
    /// them for reinsertion.
    ///
    /// An entry qualifies when its centroid lies more than
    /// `diagonal / reinsert_distance_divisor` away from the leaf centroid. At
    /// most `max_reinsert()` entries are taken, farthest first, and never so
    /// many that the leaf drops below `min_children()`.
    fn evict_for_reinsertion(&self, node: &mut Node) -> SpatialResult<Vec<Entry>> {
        let bbox = self.node_box(node)?.clone();
        let threshold = bbox.diagonal() / self.config.reinsert_distance_divisor;

        let NodeContent::Leaf { entries } = &mut node.content else {
            return Ok(Vec::new());
        };

        let mut far: Vec<(usize, f64)> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, e.bbox.centroid_distance(&bbox)))
            .filter(|(_, d)| *d > threshold)
            .collect();
        if far.is_empty() {
            return Ok(Vec::new());
        }
        far.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let spare = entries.len().saturating_sub(self.config.min_children());
        far.truncate(self.config.max_reinsert().min(spare));
        if far.is_empty() {
            return Ok(Vec::new());
        }

        let mut picked: Vec<usize> = far.iter().map(|(i, _)| *i).collect();
        picked.sort_unstable_by(|a, b| b.cmp(a));
        let mut evicted: Vec<Entry> = picked.into_iter().map(|i| entries.remove(i)).collect();

        // Farthest first
        evicted.sort_by(|a, b| {
            b.bbox
                .centroid_distance(&bbox)
                .total_cmp(&a.bbox.centroid_distance(&bbox))
        });
        node.recompute_leaf_bbox();
        Ok(evicted)
    }

    /// Split an overflowing node in two. The node keeps the first group
    /// under its own handle; the second group moves to a new sibling under
    /// the same parent. Both are written; the sibling's handle is returned.
    pub(super) fn split_node(&mut self, mut node: Node) -> SpatialResult<NodeId> {
        let min = self.config.min_children();
        let content = std::mem::replace(
            &mut node.content,
            NodeContent::Branch {
                children: Vec::new(),
            },
        );

        let sibling = match content {
            NodeContent::Leaf { entries } => {
                let (keep, moved) =
                    split_items(entries, |e| &e.bbox, min, self.calculator.as_ref())?;
                node.content = NodeContent::Leaf { entries: keep };
                node.recompute_leaf_bbox();

                let mut sibling = self.storage.create_node(NodeKind::Leaf, node.parent)?;
                sibling.content = NodeContent::Leaf { entries: moved };
                sibling.recompute_leaf_bbox();
                sibling
            }
            NodeContent::Branch { children } => {
                let mut items = Vec::with_capacity(children.len());
                for id in children {
                    let child = self.storage.read_node(id)?;
                    items.push((id, self.node_box(&child)?.clone()));
                }
                let (keep, moved) =
                    split_items(items, |(_, b)| b, min, self.calculator.as_ref())?;

                node.bbox = BoundingBox::union_all(keep.iter().map(|(_, b)| b));
                node.content = NodeContent::Branch {
                    children: keep.into_iter().map(|(id, _)| id).collect(),
                };

                let mut sibling = self.storage.create_node(NodeKind::Branch, node.parent)?;
                sibling.bbox = BoundingBox::union_all(moved.iter().map(|(_, b)| b));
                sibling.content = NodeContent::Branch {
                    children: moved.iter().map(|(id, _)| *id).collect(),
                };
                for (id, _) in &moved {
                    self.reparent(*id, sibling.id)?;
                }
                sibling
            }
        };

        self.storage.write_node(&node)?;
        self.storage.write_node(&sibling)?;
        self.counters.splits += 1;
        trace!(
            "Split node {} ({} + {} items) into sibling {}",
            node.id,
            node.len(),
            sibling.len(),
            sibling.id
        );
        Ok(sibling.id)
    }

    /// Replace a split root with a new branch over both halves.
    fn grow_root(&mut self, old_root: NodeId, sibling: NodeId) -> SpatialResult<()> {
        let mut root = self.storage.create_node(NodeKind::Branch, None)?;
        root.content = NodeContent::Branch {
            children: vec![old_root, sibling],
        };
        self.reparent(old_root, root.id)?;
        self.reparent(sibling, root.id)?;
        self.refresh_bbox(&mut root)?;
        self.storage.write_node(&root)?;
        self.storage.set_root(Some(root.id))?;
        trace!("Tree grew a level; new root {}", root.id);
        Ok(())
    }
}
