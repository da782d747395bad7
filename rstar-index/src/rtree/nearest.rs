//! Nearest-neighbour queries by branch-and-bound descent.

use super::rtree_impl::RTree;
use super::rtree_types::{Entry, Node, NodeContent, SpatialError, SpatialResult};
use crate::storage::NodeStorage;

impl<S: NodeStorage> RTree<S> {
    /// Find the `k` entries closest to `point`, nearest first.
    ///
    /// Distances are measured from the point to the nearest point of each
    /// entry box (zero when the box contains the point). Entries farther
    /// than `max_distance` are never returned. Equidistant entries come back
    /// in traversal order.
    ///
    /// # Errors
    /// [`SpatialError::InvalidArgument`] if the point has the wrong number of
    /// coordinates or a NaN one, or if `max_distance` is negative or NaN.
    pub fn find_nearest(
        &self,
        point: &[f64],
        k: usize,
        max_distance: Option<f64>,
    ) -> SpatialResult<Vec<(Entry, f64)>> {
        self.check_open()?;
        if point.len() != self.config.dimensions {
            return Err(SpatialError::InvalidArgument(format!(
                "query point has {} coordinates, tree has {} dimensions",
                point.len(),
                self.config.dimensions
            )));
        }
        if point.iter().any(|c| c.is_nan()) {
            return Err(SpatialError::InvalidArgument(
                "query point has a NaN coordinate".into(),
            ));
        }
        if let Some(limit) = max_distance {
            if limit.is_nan() || limit < 0.0 {
                return Err(SpatialError::InvalidArgument(format!(
                    "max distance must be non-negative, got {}",
                    limit
                )));
            }
        }

        let Some(root) = self.storage.root() else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut best = Nearest {
            point,
            k,
            bound: max_distance.unwrap_or(f64::INFINITY),
            found: Vec::new(),
        };
        let root = self.storage.read_node(root)?;
        self.nearest_in(&root, &mut best)?;
        Ok(best.found)
    }

    /// Every entry within `distance` of `point`, nearest first.
    pub fn find_within_distance(&self, point: &[f64], distance: f64) -> SpatialResult<Vec<(Entry, f64)>> {
        self.find_nearest(point, usize::MAX, Some(distance))
    }

    fn nearest_in(&self, node: &Node, best: &mut Nearest<'_>) -> SpatialResult<()> {
        match &node.content {
            NodeContent::Leaf { entries } => {
                for entry in entries {
                    let distance = entry.bbox.distance_to_point(best.point);
                    best.offer(entry, distance);
                }
            }
            NodeContent::Branch { children } => {
                let mut candidates: Vec<(Node, f64)> = Vec::with_capacity(children.len());
                for &child in children {
                    let child = self.storage.read_node(child)?;
                    let distance = self.node_box(&child)?.distance_to_point(best.point);
                    candidates.push((child, distance));
                }
                candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

                for (child, distance) in candidates {
                    // Sorted, so nothing after this can beat the bound either
                    if distance > best.bound {
                        break;
                    }
                    self.nearest_in(&child, best)?;
                }
            }
        }
        Ok(())
    }
}

/// The running k best, ordered by distance.
struct Nearest<'p> {
    point: &'p [f64],
    k: usize,
    bound: f64,
    found: Vec<(Entry, f64)>,
}

impl Nearest<'_> {
    fn offer(&mut self, entry: &Entry, distance: f64) {
        if distance > self.bound {
            return;
        }
        let at = self.found.partition_point(|(_, d)| *d <= distance);
        if at >= self.k {
            return;
        }
        self.found.insert(at, (entry.clone(), distance));
        self.found.truncate(self.k);
        if self.found.len() == self.k {
            if let Some((_, kth)) = self.found.last() {
                self.bound = *kth;
            }
        }
    }
}
