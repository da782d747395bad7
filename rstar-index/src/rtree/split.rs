//! R* split of an overflowing node.
//!
//! Works on any item carrying a box, so leaves (entries) and branches
//! (child handles paired with their boxes) share one implementation.

use crate::bounding_box::BoundingBox;
use crate::calculator::BoxCalculator;

use super::rtree_types::{SpatialError, SpatialResult};

/// The two sort orders evaluated along an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Lower,
    Upper,
}

const SORT_KEYS: [SortKey; 2] = [SortKey::Lower, SortKey::Upper];

/// Split `items` into two groups of at least `min_fill` items each.
///
/// The split axis is the one whose candidate distributions have the smallest
/// summed cost; along it, the distribution with the least overlap wins, ties
/// going to the smaller combined cost. Axes on which every item spans the
/// same interval are skipped; if all are, axis 0 is used.
///
/// # Errors
/// [`SpatialError::InvalidArgument`] for fewer than two items.
pub(super) fn split_items<T>(
    items: Vec<T>,
    bbox_of: impl Fn(&T) -> &BoundingBox,
    min_fill: usize,
    calc: &dyn BoxCalculator,
) -> SpatialResult<(Vec<T>, Vec<T>)> {
    let n = items.len();
    if n < 2 {
        return Err(SpatialError::InvalidArgument(format!(
            "cannot split a node with {} item(s)",
            n
        )));
    }

    let boxes: Vec<BoundingBox> = items.iter().map(|item| bbox_of(item).clone()).collect();
    let min = min_fill.clamp(1, n / 2);

    let axis = choose_axis(&boxes, min, calc);
    let (key, split_at) = choose_distribution(&boxes, axis, min, calc);
    let order = sorted_order(&boxes, axis, key);

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let first: Vec<T> = order[..split_at]
        .iter()
        .filter_map(|&i| slots[i].take())
        .collect();
    let second: Vec<T> = order[split_at..]
        .iter()
        .filter_map(|&i| slots[i].take())
        .collect();
    Ok((first, second))
}

fn choose_axis(boxes: &[BoundingBox], min: usize, calc: &dyn BoxCalculator) -> usize {
    let n = boxes.len();
    let mut best: Option<(usize, f64)> = None;

    for axis in 0..boxes[0].dimensions() {
        let first = &boxes[0];
        if boxes
            .iter()
            .all(|b| b.min(axis) == first.min(axis) && b.max(axis) == first.max(axis))
        {
            continue;
        }

        let mut total = 0.0;
        for key in SORT_KEYS {
            let order = sorted_order(boxes, axis, key);
            let (prefix, suffix) = running_unions(boxes, &order);
            for k in min..=n - min {
                total += calc.cost(&prefix[k - 1]) + calc.cost(&suffix[k]);
            }
        }

        if best.map_or(true, |(_, t)| total < t) {
            best = Some((axis, total));
        }
    }

    best.map_or(0, |(axis, _)| axis)
}

fn choose_distribution(
    boxes: &[BoundingBox],
    axis: usize,
    min: usize,
    calc: &dyn BoxCalculator,
) -> (SortKey, usize) {
    let n = boxes.len();
    let mut best = (SortKey::Lower, min, f64::INFINITY, f64::INFINITY);

    for key in SORT_KEYS {
        let order = sorted_order(boxes, axis, key);
        let (prefix, suffix) = running_unions(boxes, &order);
        for k in min..=n - min {
            let overlap = calc.overlap(&prefix[k - 1], &suffix[k]);
            let cost = calc.cost(&prefix[k - 1]) + calc.cost(&suffix[k]);
            if overlap < best.2 || (overlap == best.2 && cost < best.3) {
                best = (key, k, overlap, cost);
            }
        }
    }

    (best.0, best.1)
}

fn sorted_order(boxes: &[BoundingBox], axis: usize, key: SortKey) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&boxes[a], &boxes[b]);
        match key {
            SortKey::Lower => a
                .min(axis)
                .total_cmp(&b.min(axis))
                .then(a.max(axis).total_cmp(&b.max(axis))),
            SortKey::Upper => a
                .max(axis)
                .total_cmp(&b.max(axis))
                .then(a.min(axis).total_cmp(&b.min(axis))),
        }
    });
    order
}

/// `prefix[i]` covers `order[..=i]`, `suffix[i]` covers `order[i..]`.
fn running_unions(boxes: &[BoundingBox], order: &[usize]) -> (Vec<BoundingBox>, Vec<BoundingBox>) {
    let mut prefix: Vec<BoundingBox> = Vec::with_capacity(order.len());
    for &i in order {
        let next = match prefix.last() {
            Some(acc) => acc.union(&boxes[i]),
            None => boxes[i].clone(),
        };
        prefix.push(next);
    }

    let mut suffix: Vec<BoundingBox> = Vec::with_capacity(order.len());
    for &i in order.iter().rev() {
        let next = match suffix.last() {
            Some(acc) => acc.union(&boxes[i]),
            None => boxes[i].clone(),
        };
        suffix.push(next);
    }
    suffix.reverse();

    (prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{PerimeterCalculator, VolumeCalculator};

    fn unit(x: f64, y: f64) -> BoundingBox {
        BoundingBox::rect(x, y, x + 1.0, y + 1.0)
    }

    fn ids(group: &[(u64, BoundingBox)]) -> Vec<u64> {
        let mut ids: Vec<u64> = group.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_fewer_than_two_items_rejected() {
        let items = vec![(1u64, unit(0.0, 0.0))];
        let result = split_items(items, |(_, b)| b, 2, &PerimeterCalculator);
        assert!(matches!(result, Err(SpatialError::InvalidArgument(_))));
    }

    #[test]
    fn test_two_items() {
        let items = vec![(1u64, unit(0.0, 0.0)), (2u64, unit(5.0, 0.0))];
        let (a, b) = split_items(items, |(_, b)| b, 2, &PerimeterCalculator).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_split_separates_clusters() {
        let items = vec![
            (1u64, unit(0.0, 0.0)),
            (2, unit(100.0, 0.0)),
            (3, unit(0.5, 0.5)),
            (4, unit(101.0, 0.0)),
            (5, unit(1.0, 0.2)),
        ];
        let (a, b) = split_items(items, |(_, b)| b, 2, &PerimeterCalculator).unwrap();
        let mut groups = vec![ids(&a), ids(&b)];
        groups.sort();
        assert_eq!(groups, vec![vec![1, 3, 5], vec![2, 4]]);
    }

    #[test]
    fn test_split_uses_the_varying_axis() {
        // Same x interval everywhere; only y separates the items
        let items: Vec<(u64, BoundingBox)> = (0..6)
            .map(|i| {
                let y = if i < 3 { i as f64 } else { 50.0 + i as f64 };
                (i, unit(0.0, y))
            })
            .collect();
        let (a, b) = split_items(items, |(_, b)| b, 2, &PerimeterCalculator).unwrap();
        let mut groups = vec![ids(&a), ids(&b)];
        groups.sort();
        assert_eq!(groups, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_identical_boxes_still_split() {
        let items: Vec<(u64, BoundingBox)> = (0..5).map(|i| (i, unit(3.0, 3.0))).collect();
        let (a, b) = split_items(items, |(_, b)| b, 2, &PerimeterCalculator).unwrap();
        assert!(a.len() >= 2 && b.len() >= 2);
        assert_eq!(a.len() + b.len(), 5);
    }

    #[test]
    fn test_min_fill_respected() {
        let items: Vec<(u64, BoundingBox)> = (0..17)
            .map(|i| (i, unit((i * i) as f64, (i % 3) as f64)))
            .collect();
        let (a, b) = split_items(items, |(_, b)| b, 7, &PerimeterCalculator).unwrap();
        assert!(a.len() >= 7 && b.len() >= 7);
        assert_eq!(a.len() + b.len(), 17);
    }

    #[test]
    fn test_three_dimensional_split() {
        let cube = |x: f64, z: f64| BoundingBox::new(&[x, 0.0, z], &[x + 1.0, 1.0, z + 1.0]).unwrap();
        let items = vec![
            (1u64, cube(0.0, 0.0)),
            (2, cube(0.0, 40.0)),
            (3, cube(0.2, 0.5)),
            (4, cube(0.1, 41.0)),
        ];
        let (a, b) = split_items(items, |(_, b)| b, 2, &VolumeCalculator).unwrap();
        let mut groups = vec![ids(&a), ids(&b)];
        groups.sort();
        assert_eq!(groups, vec![vec![1, 3], vec![2, 4]]);
    }

    #[test]
    fn test_running_unions() {
        let boxes = vec![unit(0.0, 0.0), unit(2.0, 0.0), unit(4.0, 0.0)];
        let (prefix, suffix) = running_unions(&boxes, &[0, 1, 2]);
        assert_eq!(prefix[1], BoundingBox::rect(0.0, 0.0, 3.0, 1.0));
        assert_eq!(suffix[1], BoundingBox::rect(2.0, 0.0, 5.0, 1.0));
        assert_eq!(prefix[2], suffix[0]);
    }
}
