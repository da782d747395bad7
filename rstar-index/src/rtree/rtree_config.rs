//! Tree configuration.

use serde::{Deserialize, Serialize};

use super::rtree_constants::{
    DEFAULT_BUFFER_SIZE, DEFAULT_COORDINATE_SYSTEM, DEFAULT_DIMENSIONS, DEFAULT_MAX_FAN_OUT,
    MAX_COORDINATE_SYSTEM_LEN, MIN_FILL_RATIO, REINSERT_DISTANCE_DIVISOR, REINSERT_FRACTION,
};
use super::rtree_types::{SpatialError, SpatialResult};

/// Structural and tuning parameters of an R*-Tree.
///
/// `max_fan_out`, `dimensions` and `coordinate_system` are fixed for the life
/// of a tree and are persisted in the header of paged trees. The remaining
/// fields tune the insertion heuristics and may differ between sessions.
///
/// ```rust
/// use rstar_index::RTreeConfig;
///
/// let config = RTreeConfig::new(8, 3)
///     .with_coordinate_system("EPSG:4979")
///     .with_branch_grafting(false);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.min_children(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RTreeConfig {
    pub max_fan_out: usize,
    pub dimensions: usize,
    pub coordinate_system: String,
    pub min_fill_ratio: f64,
    pub reinsert_distance_divisor: f64,
    pub reinsert_fraction: f64,
    pub branch_grafting: bool,
}

impl RTreeConfig {
    pub fn new(max_fan_out: usize, dimensions: usize) -> Self {
        Self {
            max_fan_out,
            dimensions,
            ..Self::default()
        }
    }

    pub fn with_coordinate_system(mut self, descriptor: impl Into<String>) -> Self {
        self.coordinate_system = descriptor.into();
        self
    }

    pub fn with_min_fill_ratio(mut self, ratio: f64) -> Self {
        self.min_fill_ratio = ratio;
        self
    }

    pub fn with_reinsert_distance_divisor(mut self, divisor: f64) -> Self {
        self.reinsert_distance_divisor = divisor;
        self
    }

    pub fn with_reinsert_fraction(mut self, fraction: f64) -> Self {
        self.reinsert_fraction = fraction;
        self
    }

    pub fn with_branch_grafting(mut self, enabled: bool) -> Self {
        self.branch_grafting = enabled;
        self
    }

    /// Minimum number of children of a non-root node, `⌈min_fill_ratio · M⌉`.
    pub fn min_children(&self) -> usize {
        ((self.min_fill_ratio * self.max_fan_out as f64).ceil() as usize).max(1)
    }

    /// Most entries forced reinsertion may evict from one overflowing node.
    pub fn max_reinsert(&self) -> usize {
        (self.reinsert_fraction * (self.max_fan_out + 1) as f64).ceil() as usize
    }

    /// Checks every parameter.
    ///
    /// # Errors
    /// [`SpatialError::InvalidArgument`] naming the first offending field.
    pub fn validate(&self) -> SpatialResult<()> {
        if self.max_fan_out < 2 {
            return Err(SpatialError::InvalidArgument(format!(
                "max fan-out must be at least 2, got {}",
                self.max_fan_out
            )));
        }
        if self.dimensions == 0 {
            return Err(SpatialError::InvalidArgument(
                "dimensions must be at least 1".into(),
            ));
        }
        if self.coordinate_system.len() > MAX_COORDINATE_SYSTEM_LEN {
            return Err(SpatialError::InvalidArgument(format!(
                "coordinate system descriptor longer than {} bytes",
                MAX_COORDINATE_SYSTEM_LEN
            )));
        }
        if !(self.min_fill_ratio > 0.0 && self.min_fill_ratio <= 0.5) {
            return Err(SpatialError::InvalidArgument(format!(
                "min fill ratio must lie in (0, 0.5], got {}",
                self.min_fill_ratio
            )));
        }
        if !(self.reinsert_distance_divisor > 0.0) {
            return Err(SpatialError::InvalidArgument(format!(
                "reinsert distance divisor must be positive, got {}",
                self.reinsert_distance_divisor
            )));
        }
        if !(0.0..1.0).contains(&self.reinsert_fraction) {
            return Err(SpatialError::InvalidArgument(format!(
                "reinsert fraction must lie in [0, 1), got {}",
                self.reinsert_fraction
            )));
        }
        // An overflowing leaf holds M+1 entries and must keep min_children
        let kept = (self.max_fan_out + 1).saturating_sub(self.max_reinsert());
        if kept < self.min_children() {
            return Err(SpatialError::InvalidArgument(format!(
                "reinsert fraction {} would leave {} entries in a node that needs {}",
                self.reinsert_fraction,
                kept,
                self.min_children()
            )));
        }
        Ok(())
    }
}

impl Default for RTreeConfig {
    fn default() -> Self {
        Self {
            max_fan_out: DEFAULT_MAX_FAN_OUT,
            dimensions: DEFAULT_DIMENSIONS,
            coordinate_system: DEFAULT_COORDINATE_SYSTEM.to_string(),
            min_fill_ratio: MIN_FILL_RATIO,
            reinsert_distance_divisor: REINSERT_DISTANCE_DIVISOR,
            reinsert_fraction: REINSERT_FRACTION,
            branch_grafting: true,
        }
    }
}

/// Options for the paged storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedOptions {
    /// Bytes of decoded records kept in the write-back cache
    pub buffer_size: usize,
}

impl PagedOptions {
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}

impl Default for PagedOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RTreeConfig::default();
        assert_eq!(config.max_fan_out, DEFAULT_MAX_FAN_OUT);
        assert_eq!(config.dimensions, 2);
        assert_eq!(config.coordinate_system, "CARTESIAN");
        assert!(config.branch_grafting);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_children() {
        assert_eq!(RTreeConfig::new(4, 2).min_children(), 2);
        assert_eq!(RTreeConfig::new(10, 2).min_children(), 4);
        assert_eq!(RTreeConfig::new(2, 2).min_children(), 1);
        assert_eq!(RTreeConfig::new(16, 2).min_children(), 7);
    }

    #[test]
    fn test_max_reinsert() {
        assert_eq!(RTreeConfig::new(4, 2).max_reinsert(), 2);
        assert_eq!(RTreeConfig::new(16, 2).max_reinsert(), 6);
        assert_eq!(
            RTreeConfig::new(16, 2).with_reinsert_fraction(0.0).max_reinsert(),
            0
        );
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(RTreeConfig::new(1, 2).validate().is_err());
        assert!(RTreeConfig::new(4, 0).validate().is_err());
        assert!(RTreeConfig::new(4, 2)
            .with_coordinate_system("x".repeat(65))
            .validate()
            .is_err());
        assert!(RTreeConfig::new(4, 2)
            .with_min_fill_ratio(0.7)
            .validate()
            .is_err());
        assert!(RTreeConfig::new(4, 2)
            .with_reinsert_distance_divisor(0.0)
            .validate()
            .is_err());
        assert!(RTreeConfig::new(4, 2)
            .with_reinsert_fraction(1.5)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_fraction_that_underfills() {
        // 5 entries, 4 evicted, 1 left against a minimum of 2
        let config = RTreeConfig::new(4, 2).with_reinsert_fraction(0.7);
        assert!(matches!(
            config.validate(),
            Err(SpatialError::InvalidArgument(message)) if message.contains("reinsert fraction")
        ));
        assert!(RTreeConfig::new(4, 2)
            .with_reinsert_fraction(0.99)
            .validate()
            .is_err());

        // 5 entries, 3 evicted, 2 left
        assert!(RTreeConfig::new(4, 2)
            .with_reinsert_fraction(0.5)
            .validate()
            .is_ok());
        assert!(RTreeConfig::new(16, 2)
            .with_reinsert_fraction(0.5)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_paged_options() {
        assert_eq!(PagedOptions::default().buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(PagedOptions::with_buffer_size(4096).buffer_size, 4096);
    }
}
