//! Visitor-driven traversal.
//!
//! A [`TreeVisitor`] is consulted once per node reached (`filter`) and once
//! per matching entry (`visit`), and steers the walk through the
//! [`VisitResult`] it returns.

use super::rtree_impl::RTree;
use super::rtree_types::{Entry, Node, NodeContent, SpatialResult};
use crate::bounding_box::BoundingBox;
use crate::storage::NodeStorage;

/// Traversal control returned by a visitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitResult {
    /// Keep going
    Continue,
    /// Do not descend into the current node (ignored for entries)
    SkipSubtree,
    /// Stop iterating the remaining siblings at the current level
    SkipSiblings,
    /// Abort the whole traversal
    Terminate,
}

/// Callbacks invoked by [`RTree::search`].
///
/// Any `FnMut(&Entry) -> VisitResult` closure is a visitor that accepts
/// every node.
pub trait TreeVisitor {
    /// Called when a node is reached, before its children or entries.
    fn filter(&mut self, _node: &Node) -> VisitResult {
        VisitResult::Continue
    }

    /// Called for every entry intersecting the search region.
    fn visit(&mut self, entry: &Entry) -> VisitResult;
}

impl<F> TreeVisitor for F
where
    F: FnMut(&Entry) -> VisitResult,
{
    fn visit(&mut self, entry: &Entry) -> VisitResult {
        self(entry)
    }
}

/// Where the region still needs checking below a node.
#[derive(Clone, Copy)]
enum Scope<'r> {
    /// Every descendant matches
    Everything,
    Region(&'r BoundingBox),
}

impl<'r> Scope<'r> {
    /// Scope for a node with box `bbox`, or `None` if the node is disjoint
    /// from the region.
    fn narrow(self, bbox: &BoundingBox) -> Option<Scope<'r>> {
        match self {
            Scope::Everything => Some(Scope::Everything),
            Scope::Region(region) if region.contains(bbox) => Some(Scope::Everything),
            Scope::Region(region) if region.intersects(bbox) => Some(self),
            Scope::Region(_) => None,
        }
    }

    fn admits(self, bbox: &BoundingBox) -> bool {
        match self {
            Scope::Everything => true,
            Scope::Region(region) => region.intersects(bbox),
        }
    }
}

impl<S: NodeStorage> RTree<S> {
    /// Walk the tree, handing every entry that intersects `region` to the
    /// visitor. `None` visits every entry.
    ///
    /// Returns [`VisitResult::Terminate`] if the visitor aborted the walk and
    /// [`VisitResult::Continue`] otherwise. An empty tree visits nothing.
    pub fn search<V>(&self, region: Option<&BoundingBox>, visitor: &mut V) -> SpatialResult<VisitResult>
    where
        V: TreeVisitor + ?Sized,
    {
        self.check_open()?;
        if let Some(region) = region {
            region.check_valid(self.config.dimensions)?;
        }

        let Some(root) = self.storage.root() else {
            return Ok(VisitResult::Continue);
        };
        let root = self.storage.read_node(root)?;
        let scope = region.map_or(Scope::Everything, Scope::Region);
        let Some(scope) = root.bbox.as_ref().and_then(|b| scope.narrow(b)) else {
            return Ok(VisitResult::Continue);
        };

        match self.search_node(&root, scope, visitor)? {
            VisitResult::Terminate => Ok(VisitResult::Terminate),
            _ => Ok(VisitResult::Continue),
        }
    }

    fn search_node<V>(&self, node: &Node, scope: Scope<'_>, visitor: &mut V) -> SpatialResult<VisitResult>
    where
        V: TreeVisitor + ?Sized,
    {
        match visitor.filter(node) {
            VisitResult::Continue => {}
            VisitResult::SkipSubtree => return Ok(VisitResult::Continue),
            other => return Ok(other),
        }

        match &node.content {
            NodeContent::Leaf { entries } => {
                for entry in entries.iter().filter(|e| scope.admits(&e.bbox)) {
                    match visitor.visit(entry) {
                        VisitResult::Terminate => return Ok(VisitResult::Terminate),
                        VisitResult::SkipSiblings => break,
                        _ => {}
                    }
                }
            }
            NodeContent::Branch { children } => {
                for &id in children {
                    let child = self.storage.read_node(id)?;
                    let Some(child_scope) = child.bbox.as_ref().and_then(|b| scope.narrow(b)) else {
                        continue;
                    };
                    match self.search_node(&child, child_scope, visitor)? {
                        VisitResult::Terminate => return Ok(VisitResult::Terminate),
                        VisitResult::SkipSiblings => break,
                        _ => {}
                    }
                }
            }
        }
        Ok(VisitResult::Continue)
    }

    /// Every entry whose box intersects `bbox`
    pub fn find_intersecting(&self, bbox: &BoundingBox) -> SpatialResult<Vec<Entry>> {
        let mut found = Vec::new();
        self.search(Some(bbox), &mut |e: &Entry| {
            found.push(e.clone());
            VisitResult::Continue
        })?;
        Ok(found)
    }

    /// Every entry whose box lies entirely inside `bbox`
    pub fn find_contained(&self, bbox: &BoundingBox) -> SpatialResult<Vec<Entry>> {
        let mut found = Vec::new();
        self.search(Some(bbox), &mut |e: &Entry| {
            if bbox.contains(&e.bbox) {
                found.push(e.clone());
            }
            VisitResult::Continue
        })?;
        Ok(found)
    }

    /// Every indexed entry
    pub fn entries(&self) -> SpatialResult<Vec<Entry>> {
        let mut found = Vec::new();
        self.search(None, &mut |e: &Entry| {
            found.push(e.clone());
            VisitResult::Continue
        })?;
        Ok(found)
    }
}
