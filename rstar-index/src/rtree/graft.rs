//! Branch grafting: redistributing entries between overlapping sibling
//! leaves so that a later split is less likely.

use log::trace;

use super::rtree_constants::{GRAFT_LOWER_FRACTION, GRAFT_UPPER_FRACTION};
use super::rtree_impl::RTree;
use super::rtree_types::{Entry, NodeContent, NodeId, SpatialResult};
use crate::bounding_box::BoundingBox;
use crate::calculator::BoxCalculator;
use crate::storage::NodeStorage;

impl<S: NodeStorage> RTree<S> {
    /// Try grafting each half of a fresh leaf split with every other leaf
    /// under the same parent.
    pub(super) fn graft_after_split(
        &mut self,
        siblings: &[NodeId],
        halves: [NodeId; 2],
    ) -> SpatialResult<()> {
        for half in halves {
            for &other in siblings.iter().filter(|id| !halves.contains(*id)) {
                self.try_graft(half, other)?;
            }
        }
        Ok(())
    }

    /// Redistribute the entries of two intersecting sibling leaves when that
    /// strictly lowers their overlap. Returns whether anything moved.
    pub(super) fn try_graft(&mut self, a: NodeId, b: NodeId) -> SpatialResult<bool> {
        let mut left = self.storage.read_node(a)?;
        let mut right = self.storage.read_node(b)?;
        if !left.is_leaf() || !right.is_leaf() || left.len() < 2 || right.len() < 2 {
            return Ok(false);
        }

        let (left_box, right_box) = (self.node_box(&left)?, self.node_box(&right)?);
        if !left_box.intersects(right_box) {
            return Ok(false);
        }
        let current = self.calculator.overlap(left_box, right_box);

        let Some((first, second, overlap)) = graft_distribution(
            left.entries(),
            right.entries(),
            self.config.min_children(),
            self.config.max_fan_out,
            self.calculator.as_ref(),
        ) else {
            return Ok(false);
        };
        if overlap >= current {
            return Ok(false);
        }

        left.content = NodeContent::Leaf { entries: first };
        right.content = NodeContent::Leaf { entries: second };
        left.recompute_leaf_bbox();
        right.recompute_leaf_bbox();
        self.storage.write_node(&left)?;
        self.storage.write_node(&right)?;
        self.counters.grafts += 1;
        trace!(
            "Grafted leaves {} and {} (overlap {} -> {})",
            a,
            b,
            current,
            overlap
        );
        Ok(true)
    }
}

/// Pool both entry sets, sort them along the axis of greatest extent and
/// find the least-overlapping cut between 40% and 60% of the pool.
///
/// Both groups must hold between `min` and `max` entries. Returns the two
/// groups and their overlap, or `None` if no cut qualifies.
pub(super) fn graft_distribution(
    a: &[Entry],
    b: &[Entry],
    min: usize,
    max: usize,
    calc: &dyn BoxCalculator,
) -> Option<(Vec<Entry>, Vec<Entry>, f64)> {
    let mut pooled: Vec<Entry> = a.iter().chain(b).cloned().collect();
    let n = pooled.len();
    let bounds = BoundingBox::union_all(pooled.iter().map(|e| &e.bbox))?;
    let axis = (0..bounds.dimensions()).max_by(|&x, &y| bounds.span(x).total_cmp(&bounds.span(y)))?;

    let centre = |e: &Entry| e.bbox.min(axis) + e.bbox.max(axis);
    pooled.sort_by(|p, q| centre(p).total_cmp(&centre(q)));

    let lo = ((n as f64 * GRAFT_LOWER_FRACTION).ceil() as usize).max(min).max(1);
    let hi = ((n as f64 * GRAFT_UPPER_FRACTION).floor() as usize).min(n.saturating_sub(min));

    let mut best: Option<(usize, f64, f64)> = None;
    for k in lo..=hi {
        if k > max || n - k > max {
            continue;
        }
        let first = BoundingBox::union_all(pooled[..k].iter().map(|e| &e.bbox))?;
        let second = BoundingBox::union_all(pooled[k..].iter().map(|e| &e.bbox))?;
        let overlap = calc.overlap(&first, &second);
        let cost = calc.cost(&first) + calc.cost(&second);
        let better = match best {
            None => true,
            Some((_, o, c)) => overlap < o || (overlap == o && cost < c),
        };
        if better {
            best = Some((k, overlap, cost));
        }
    }

    let (k, overlap, _) = best?;
    let second = pooled.split_off(k);
    Some((pooled, second, overlap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::PerimeterCalculator;
    use crate::rtree::{NodeKind, RTreeConfig};

    fn unit_at(x: f64, id: u64) -> Entry {
        Entry::new(BoundingBox::rect(x, 0.0, x + 1.0, 1.0), id)
    }

    #[test]
    fn test_distribution_separates_interleaved_sets() {
        let a = vec![unit_at(0.0, 1), unit_at(2.0, 2), unit_at(10.0, 3), unit_at(12.0, 4)];
        let b = vec![unit_at(1.0, 5), unit_at(3.0, 6), unit_at(11.0, 7), unit_at(13.0, 8)];

        let (first, second, overlap) = graft_distribution(&a, &b, 2, 4, &PerimeterCalculator).unwrap();
        assert_eq!(overlap, 0.0);
        let mut left: Vec<u64> = first.iter().map(|e| e.id).collect();
        left.sort_unstable();
        assert_eq!(left, vec![1, 2, 5, 6]);
        assert_eq!(second.len(), 4);
    }

    #[test]
    fn test_distribution_respects_capacity() {
        let a = vec![unit_at(0.0, 1), unit_at(1.0, 2)];
        let b = vec![unit_at(0.5, 3), unit_at(1.5, 4)];
        // A pool of 4 cut at 40-60% gives 2 + 2, which a capacity of 1 rules out
        assert!(graft_distribution(&a, &b, 1, 1, &PerimeterCalculator).is_none());
    }

    #[test]
    fn test_try_graft_rewrites_both_leaves() {
        let mut tree = RTree::in_memory(RTreeConfig::new(4, 2)).unwrap();

        let mut root = tree.storage.create_node(NodeKind::Branch, None).unwrap();
        let mut left = tree.storage.create_node(NodeKind::Leaf, Some(root.id)).unwrap();
        let mut right = tree.storage.create_node(NodeKind::Leaf, Some(root.id)).unwrap();
        left.content = NodeContent::Leaf {
            entries: vec![unit_at(0.0, 1), unit_at(2.0, 2), unit_at(10.0, 3), unit_at(12.0, 4)],
        };
        right.content = NodeContent::Leaf {
            entries: vec![unit_at(1.0, 5), unit_at(3.0, 6), unit_at(11.0, 7), unit_at(13.0, 8)],
        };
        left.recompute_leaf_bbox();
        right.recompute_leaf_bbox();
        root.content = NodeContent::Branch {
            children: vec![left.id, right.id],
        };
        root.bbox = Some(BoundingBox::rect(0.0, 0.0, 14.0, 1.0));
        for node in [&left, &right, &root] {
            tree.storage.write_node(node).unwrap();
        }
        tree.storage.set_root(Some(root.id)).unwrap();
        tree.storage.set_element_count(8).unwrap();

        assert!(tree.try_graft(left.id, right.id).unwrap());
        assert_eq!(tree.counters.grafts, 1);

        let left = tree.storage.read_node(left.id).unwrap();
        let right = tree.storage.read_node(right.id).unwrap();
        assert!(!left.bbox.unwrap().intersects(&right.bbox.unwrap()));
        assert!(tree.check_integrity().unwrap().is_valid);

        // A second attempt finds nothing to improve
        assert!(!tree.try_graft(left.id, right.id).unwrap());
    }

    #[test]
    fn test_grafting_toggle_keeps_trees_valid() {
        for grafting in [true, false] {
            let config = RTreeConfig::new(5, 2).with_branch_grafting(grafting);
            let mut tree = RTree::in_memory(config).unwrap();
            for i in 0..400u64 {
                let x = ((i * 37) % 113) as f64 * 0.7;
                let y = ((i * 61) % 97) as f64 * 0.7;
                tree.insert(Entry::new(BoundingBox::rect(x, y, x + 2.5, y + 2.5), i))
                    .unwrap();
            }
            if !grafting {
                assert_eq!(tree.counters.grafts, 0);
            }
            let report = tree.check_integrity().unwrap();
            assert!(report.is_valid, "{:?}", report.errors);
            assert_eq!(report.entries_found, 400);
        }
    }
}
