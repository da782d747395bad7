//! Constants for the R*-Tree and its paged file format.

/// Default maximum number of children per node (M)
pub const DEFAULT_MAX_FAN_OUT: usize = 16;

/// Default dimensionality
pub const DEFAULT_DIMENSIONS: usize = 2;

/// Default coordinate system descriptor
pub const DEFAULT_COORDINATE_SYSTEM: &str = "CARTESIAN";

/// Longest coordinate system descriptor the file header can hold
pub const MAX_COORDINATE_SYSTEM_LEN: usize = 64;

/// Minimum fill of a non-root node as a fraction of M
pub const MIN_FILL_RATIO: f64 = 0.4;

/// Forced reinsertion evicts entries farther than `diagonal / divisor` from
/// the node centroid. Empirical value from the R*-tree paper.
pub const REINSERT_DISTANCE_DIVISOR: f64 = 1.666_666_666;

/// Upper bound on the share of an overflowing node that is reinserted
pub const REINSERT_FRACTION: f64 = 0.3;

/// Grafting searches split points between these fractions of the pooled entries
pub const GRAFT_LOWER_FRACTION: f64 = 0.4;
pub const GRAFT_UPPER_FRACTION: f64 = 0.6;

/// Default I/O buffer for the paged backend (1 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Fewest records the paged backend keeps cached, whatever the buffer size
pub const MIN_CACHED_RECORDS: usize = 16;

/// Magic number for file format identification
pub const MAGIC: u32 = 0x5253_5452; // "RSTR"

/// File format version
pub const VERSION: u32 = 1;

/// Bytes reserved at the start of the file for the header
pub const HEADER_SIZE: u64 = 512;
