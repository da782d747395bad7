//! Hilbert curve ordering for bulk insertion.
//!
//! Points close in the plane stay close along the curve, so inserting in
//! curve order keeps consecutive entries in the same leaves.

use crate::bounding_box::BoundingBox;

/// Grid resolution used by [`hilbert_key`]: a `2^16 x 2^16` grid.
pub const HILBERT_ORDER: u32 = 16;

/// Position along the Hilbert curve of the first two coordinates of
/// `point`, after normalizing them to `bounds`.
///
/// Coordinates outside `bounds` are clamped. An axis of zero extent maps to
/// the middle of the grid.
///
/// ```rust
/// use rstar_index::hilbert::hilbert_key;
/// use rstar_index::BoundingBox;
///
/// let bounds = BoundingBox::rect(0.0, 0.0, 100.0, 100.0);
/// assert_eq!(hilbert_key(&[0.0, 0.0], &bounds), 0);
/// ```
pub fn hilbert_key(point: &[f64], bounds: &BoundingBox) -> u64 {
    let side = 1u64 << HILBERT_ORDER;
    let cell = |axis: usize| -> u64 {
        let extent = bounds.span(axis);
        let unit = if extent > 0.0 {
            ((point[axis] - bounds.min(axis)) / extent).clamp(0.0, 1.0)
        } else {
            0.5
        };
        ((unit * side as f64) as u64).min(side - 1)
    };
    grid_distance(side, cell(0), cell(1))
}

/// Distance along the curve of cell `(x, y)` in a `side x side` grid.
fn grid_distance(side: u64, mut x: u64, mut y: u64) -> u64 {
    let mut d = 0u64;
    let mut s = side / 2;
    while s > 0 {
        let rx = u64::from(x & s != 0);
        let ry = u64::from(y & s != 0);
        d += s * s * ((3 * rx) ^ ry);

        // Rotate the quadrant so the sub-curve has the canonical orientation
        if ry == 0 {
            if rx == 1 {
                x = s - 1 - (x & (s - 1));
                y = s - 1 - (y & (s - 1));
            }
            std::mem::swap(&mut x, &mut y);
        }
        s /= 2;
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_grid_order() {
        // The order-1 curve visits (0,0), (0,1), (1,1), (1,0)
        assert_eq!(grid_distance(2, 0, 0), 0);
        assert_eq!(grid_distance(2, 0, 1), 1);
        assert_eq!(grid_distance(2, 1, 1), 2);
        assert_eq!(grid_distance(2, 1, 0), 3);
    }

    #[test]
    fn test_grid_is_a_permutation() {
        let side = 8u64;
        let mut seen: Vec<u64> = (0..side)
            .flat_map(|x| (0..side).map(move |y| grid_distance(side, x, y)))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..side * side).collect::<Vec<_>>());
    }

    #[test]
    fn test_consecutive_cells_are_adjacent() {
        let side = 16u64;
        let mut by_distance = vec![(0u64, 0u64); (side * side) as usize];
        for x in 0..side {
            for y in 0..side {
                by_distance[grid_distance(side, x, y) as usize] = (x, y);
            }
        }
        for pair in by_distance.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert_eq!(a.0.abs_diff(b.0) + a.1.abs_diff(b.1), 1);
        }
    }

    #[test]
    fn test_key_clamps_and_centers() {
        let bounds = BoundingBox::rect(-180.0, -90.0, 180.0, 90.0);
        assert_eq!(hilbert_key(&[-500.0, -500.0], &bounds), 0);
        assert_eq!(
            hilbert_key(&[500.0, 500.0], &bounds),
            hilbert_key(&[180.0, 90.0], &bounds)
        );

        let flat = BoundingBox::rect(5.0, 5.0, 5.0, 5.0);
        let centre = 1u64 << (HILBERT_ORDER - 1);
        assert_eq!(
            hilbert_key(&[5.0, 5.0], &flat),
            grid_distance(1 << HILBERT_ORDER, centre, centre)
        );
    }
}
