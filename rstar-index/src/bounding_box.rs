use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::rtree::{SpatialError, SpatialResult};

/// Inline storage for box coordinates; 2D boxes never touch the heap.
pub(crate) type Coords = SmallVec<[f64; 4]>;

/// An axis-aligned bounding box in D dimensions.
///
/// `BoundingBox` stores `2 × D` coordinates: the lower corner followed by the
/// upper corner. [`BoundingBox::new`] rejects NaN and inverted corners; the
/// infallible constructors do not, and the tree checks every box it is
/// handed with [`BoundingBox::check_valid`]. Boxes are immutable by
/// convention; the tree never mutates a box it did not create.
///
/// # Examples
///
/// ```rust
/// use rstar_index::BoundingBox;
///
/// let bbox = BoundingBox::rect(0.0, 0.0, 100.0, 100.0);
/// assert!(bbox.contains_point(&[50.0, 50.0]));
///
/// let cube = BoundingBox::new(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]).unwrap();
/// assert_eq!(cube.dimensions(), 3);
/// ```
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct BoundingBox {
    coords: Coords,
}

impl Eq for BoundingBox {}

impl Hash for BoundingBox {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for c in &self.coords {
            c.to_bits().hash(state);
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundingBox({:?}, {:?})", self.lower(), self.upper())
    }
}

impl BoundingBox {
    /// Creates a box from its lower and upper corners.
    ///
    /// # Errors
    /// Returns [`SpatialError::InvalidArgument`] if the corners have different
    /// or zero dimensionality, contain NaN, or if `lower[i] > upper[i]`.
    pub fn new(lower: &[f64], upper: &[f64]) -> SpatialResult<Self> {
        if lower.is_empty() || lower.len() != upper.len() {
            return Err(SpatialError::InvalidArgument(format!(
                "corner dimensions differ or are empty (lower: {}, upper: {})",
                lower.len(),
                upper.len()
            )));
        }
        check_corners(lower, upper)?;

        let mut coords = Coords::with_capacity(lower.len() * 2);
        coords.extend_from_slice(lower);
        coords.extend_from_slice(upper);
        Ok(Self { coords })
    }

    /// Creates a box from a flat `[lower..., upper...]` coordinate array.
    ///
    /// # Errors
    /// Same conditions as [`BoundingBox::new`], plus an odd-length array.
    pub fn from_coords(coords: &[f64]) -> SpatialResult<Self> {
        if coords.len() % 2 != 0 {
            return Err(SpatialError::InvalidArgument(format!(
                "coordinate array of length {} is not 2 x D",
                coords.len()
            )));
        }
        let d = coords.len() / 2;
        Self::new(&coords[..d], &coords[d..])
    }

    /// Creates a 2D box. Swapped corners are put in order; NaN coordinates
    /// are kept as given and rejected by [`BoundingBox::check_valid`].
    pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let (lo_x, hi_x) = if min_x > max_x { (max_x, min_x) } else { (min_x, max_x) };
        let (lo_y, hi_y) = if min_y > max_y { (max_y, min_y) } else { (min_y, max_y) };
        let mut coords = Coords::new();
        coords.extend_from_slice(&[lo_x, lo_y, hi_x, hi_y]);
        Self { coords }
    }

    /// Creates a degenerate box covering a single point.
    ///
    /// Coordinates are not checked here; the tree rejects a point holding NaN.
    pub fn point(point: &[f64]) -> Self {
        let mut coords = Coords::with_capacity(point.len() * 2);
        coords.extend_from_slice(point);
        coords.extend_from_slice(point);
        Self { coords }
    }

    /// Creates a box covering all of D-dimensional space.
    pub fn infinite(dimensions: usize) -> Self {
        let mut coords = Coords::with_capacity(dimensions * 2);
        coords.extend(std::iter::repeat(f64::NEG_INFINITY).take(dimensions));
        coords.extend(std::iter::repeat(f64::INFINITY).take(dimensions));
        Self { coords }
    }

    /// Returns the smallest box covering every box in `boxes`, or `None` if
    /// the iterator is empty.
    pub fn union_all<'a, I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        let mut iter = boxes.into_iter();
        let mut acc = iter.next()?.clone();
        for b in iter {
            acc.expand(b);
        }
        Some(acc)
    }

    /// Number of dimensions (D).
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.coords.len() / 2
    }

    /// The lower corner.
    #[inline]
    pub fn lower(&self) -> &[f64] {
        &self.coords[..self.dimensions()]
    }

    /// The upper corner.
    #[inline]
    pub fn upper(&self) -> &[f64] {
        &self.coords[self.dimensions()..]
    }

    /// The flat `[lower..., upper...]` coordinate array.
    #[inline]
    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    #[inline]
    pub fn min(&self, axis: usize) -> f64 {
        self.coords[axis]
    }

    #[inline]
    pub fn max(&self, axis: usize) -> f64 {
        self.coords[self.dimensions() + axis]
    }

    /// Extent along `axis`.
    #[inline]
    pub fn span(&self, axis: usize) -> f64 {
        self.max(axis) - self.min(axis)
    }

    /// Fails with `InvalidArgument` unless this box has `expected` dimensions,
    /// holds no NaN and has `lower[i] <= upper[i]` on every axis.
    pub fn check_valid(&self, expected: usize) -> SpatialResult<()> {
        if self.dimensions() != expected {
            return Err(SpatialError::InvalidArgument(format!(
                "expected a {}-dimensional box, got {} dimensions",
                expected,
                self.dimensions()
            )));
        }
        check_corners(self.lower(), self.upper())
    }

    pub fn contains_point(&self, point: &[f64]) -> bool {
        point.len() == self.dimensions()
            && point
                .iter()
                .enumerate()
                .all(|(i, p)| *p >= self.min(i) && *p <= self.max(i))
    }

    /// True if `other` lies entirely inside this box (shared borders count).
    /// Boxes of different dimensionality never contain one another.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.dimensions() == other.dimensions()
            && (0..self.dimensions()).all(|i| other.min(i) >= self.min(i) && other.max(i) <= self.max(i))
    }

    /// True if the boxes share at least one point (touching counts).
    /// Boxes of different dimensionality never intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.dimensions() == other.dimensions()
            && (0..self.dimensions()).all(|i| self.min(i) <= other.max(i) && self.max(i) >= other.min(i))
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut result = self.clone();
        result.expand(other);
        result
    }

    /// Grows this box in place to cover `other`.
    pub fn expand(&mut self, other: &BoundingBox) {
        let d = self.dimensions();
        for i in 0..d {
            self.coords[i] = self.coords[i].min(other.min(i));
            self.coords[d + i] = self.coords[d + i].max(other.max(i));
        }
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }
        let d = self.dimensions();
        let mut coords = Coords::with_capacity(d * 2);
        coords.extend((0..d).map(|i| self.min(i).max(other.min(i))));
        coords.extend((0..d).map(|i| self.max(i).min(other.max(i))));
        Some(BoundingBox { coords })
    }

    pub fn centroid(&self) -> Coords {
        (0..self.dimensions())
            .map(|i| (self.min(i) + self.max(i)) / 2.0)
            .collect()
    }

    /// Euclidean distance between the centroids of two boxes.
    pub fn centroid_distance(&self, other: &BoundingBox) -> f64 {
        self.centroid()
            .iter()
            .zip(other.centroid().iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    /// Length of the lower-to-upper corner diagonal.
    pub fn diagonal(&self) -> f64 {
        (0..self.dimensions())
            .map(|i| self.span(i) * self.span(i))
            .sum::<f64>()
            .sqrt()
    }

    /// Minimum Euclidean distance from `point` to this box; zero inside it.
    pub fn distance_to_point(&self, point: &[f64]) -> f64 {
        point
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let closest = p.max(self.min(i)).min(self.max(i));
                (p - closest) * (p - closest)
            })
            .sum::<f64>()
            .sqrt()
    }

    pub fn is_point(&self) -> bool {
        (0..self.dimensions()).all(|i| self.min(i) == self.max(i))
    }
}

fn check_corners(lower: &[f64], upper: &[f64]) -> SpatialResult<()> {
    for (axis, (lo, hi)) in lower.iter().zip(upper).enumerate() {
        if lo.is_nan() || hi.is_nan() {
            return Err(SpatialError::InvalidArgument(format!(
                "NaN coordinate on axis {}",
                axis
            )));
        }
        if lo > hi {
            return Err(SpatialError::InvalidArgument(format!(
                "lower bound {} exceeds upper bound {} on axis {}",
                lo, hi, axis
            )));
        }
    }
    Ok(())
}
