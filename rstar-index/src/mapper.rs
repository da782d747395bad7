//! Typed facade over [`RTree`] for caller-owned element types.
//!
//! The tree only stores boxes and integer identifiers. An [`ElementMapper`]
//! derives both from a domain object on the way in and turns identifiers
//! back into objects on the way out.

use log::warn;

use crate::bounding_box::BoundingBox;
use crate::rtree::{ElementId, Entry, RTree, SpatialResult, VisitResult};
use crate::storage::NodeStorage;

/// Maps domain objects to index entries and back.
pub trait ElementMapper {
    type Element;

    /// Identifier stored in the index for `element`
    fn element_id(&self, element: &Self::Element) -> ElementId;

    /// Box under which `element` is indexed.
    fn bounding_box(&self, element: &Self::Element) -> SpatialResult<BoundingBox>;

    /// Look up the element behind an identifier. `None` if it no longer
    /// exists on the caller's side.
    fn resolve(&self, id: ElementId) -> Option<Self::Element>;
}

/// An [`RTree`] that speaks in elements instead of entries.
pub struct MappedRTree<S: NodeStorage, M: ElementMapper> {
    tree: RTree<S>,
    mapper: M,
}

impl<S: NodeStorage, M: ElementMapper> MappedRTree<S, M> {
    pub fn new(tree: RTree<S>, mapper: M) -> Self {
        Self { tree, mapper }
    }

    pub fn tree(&self) -> &RTree<S> {
        &self.tree
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn insert(&mut self, element: &M::Element) -> SpatialResult<()> {
        let entry = self.entry_for(element)?;
        self.tree.insert(entry)
    }

    /// Remove an element; `false` if it was not indexed under its current box.
    pub fn remove(&mut self, element: &M::Element) -> SpatialResult<bool> {
        let entry = self.entry_for(element)?;
        self.tree.remove(&entry)
    }

    /// Elements whose boxes intersect `region`, or every element for `None`.
    ///
    /// Identifiers the mapper cannot resolve are skipped.
    pub fn search(&self, region: Option<&BoundingBox>) -> SpatialResult<Vec<M::Element>> {
        let mut found = Vec::new();
        let mut unresolved = 0usize;
        self.tree.search(region, &mut |entry: &Entry| {
            match self.mapper.resolve(entry.id) {
                Some(element) => found.push(element),
                None => {
                    warn!("Indexed element {} could not be resolved", entry.id);
                    unresolved += 1;
                }
            }
            VisitResult::Continue
        })?;
        if unresolved > 0 {
            warn!("Skipped {} unresolved elements in search", unresolved);
        }
        Ok(found)
    }

    pub fn close(&mut self) -> SpatialResult<()> {
        self.tree.close()
    }

    /// Give back the underlying tree and mapper.
    pub fn into_parts(self) -> (RTree<S>, M) {
        (self.tree, self.mapper)
    }

    fn entry_for(&self, element: &M::Element) -> SpatialResult<Entry> {
        let bbox = self.mapper.bounding_box(element)?;
        Ok(Entry::new(bbox, self.mapper.element_id(element)))
    }
}
