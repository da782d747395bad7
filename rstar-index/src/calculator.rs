//! Cost metrics used by subtree choice, splitting and grafting.
//!
//! Low-dimensional trees are tuned on box perimeter (the "margin" of the
//! R*-tree paper); above two dimensions the volume is the better-behaved
//! measure. The metric is picked once, when the tree is built.

use std::fmt::Debug;

use crate::bounding_box::BoundingBox;

/// Geometry cost strategy for a tree of fixed dimensionality.
pub trait BoxCalculator: Debug + Send + Sync {
    /// The cost of a single box: perimeter or volume depending on the strategy.
    fn cost(&self, bbox: &BoundingBox) -> f64;

    /// How much two boxes overlap. Zero for disjoint boxes.
    fn overlap(&self, a: &BoundingBox, b: &BoundingBox) -> f64 {
        a.intersection(b).map(|i| volume(&i)).unwrap_or(0.0)
    }

    /// Growth in cost needed for `bbox` to also cover `added`.
    fn enlargement(&self, bbox: &BoundingBox, added: &BoundingBox) -> f64 {
        self.cost(&bbox.union(added)) - self.cost(bbox)
    }

    fn name(&self) -> &'static str;
}

/// Sum of edge lengths of the box (perimeter in 2D).
pub fn perimeter(bbox: &BoundingBox) -> f64 {
    2.0 * (0..bbox.dimensions()).map(|i| bbox.span(i)).sum::<f64>()
}

/// Product of the spans (area in 2D).
pub fn volume(bbox: &BoundingBox) -> f64 {
    (0..bbox.dimensions()).map(|i| bbox.span(i)).product()
}

/// Perimeter-driven costs for 1D and 2D trees.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerimeterCalculator;

impl BoxCalculator for PerimeterCalculator {
    fn cost(&self, bbox: &BoundingBox) -> f64 {
        perimeter(bbox)
    }

    fn name(&self) -> &'static str {
        "perimeter"
    }
}

/// Volume-driven costs for trees above two dimensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeCalculator;

impl BoxCalculator for VolumeCalculator {
    fn cost(&self, bbox: &BoundingBox) -> f64 {
        volume(bbox)
    }

    fn name(&self) -> &'static str {
        "volume"
    }
}

/// Picks the cost strategy for a tree of the given dimensionality.
pub fn calculator_for(dimensions: usize) -> Box<dyn BoxCalculator> {
    if dimensions <= 2 {
        Box::new(PerimeterCalculator)
    } else {
        Box::new(VolumeCalculator)
    }
}
