//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstar_index::{BoundingBox, Entry, NodeStorage, RTree};
use tempfile::TempDir;

/// A scratch directory that lives as long as the test holds it.
pub struct TestContext {
    dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        init_logging();
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Route `log` output to the test harness; `RUST_LOG=trace` shows splits and
/// reinsertions.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Random 2D boxes of side up to `max_side` inside `[0, extent]^2`.
pub fn random_entries(seed: u64, count: u64, extent: f64, max_side: f64) -> Vec<Entry> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|id| {
            let x = rng.gen_range(0.0..extent);
            let y = rng.gen_range(0.0..extent);
            let w = rng.gen_range(0.0..max_side);
            let h = rng.gen_range(0.0..max_side);
            Entry::new(BoundingBox::rect(x, y, x + w, y + h), id)
        })
        .collect()
}

pub fn random_region(rng: &mut StdRng, extent: f64) -> BoundingBox {
    let x = rng.gen_range(-10.0..extent);
    let y = rng.gen_range(-10.0..extent);
    let w = rng.gen_range(0.0..extent / 3.0);
    let h = rng.gen_range(0.0..extent / 3.0);
    BoundingBox::rect(x, y, x + w, y + h)
}

pub fn ids(entries: &[Entry]) -> BTreeSet<u64> {
    entries.iter().map(|e| e.id).collect()
}

/// Entry identifiers matching `region`, by exhaustive scan.
pub fn brute_force(entries: &[Entry], region: &BoundingBox) -> BTreeSet<u64> {
    entries
        .iter()
        .filter(|e| region.intersects(&e.bbox))
        .map(|e| e.id)
        .collect()
}

/// Panics with the full error list if the tree fails its integrity check.
pub fn assert_valid<S: NodeStorage>(tree: &RTree<S>) {
    let report = tree.check_integrity().expect("integrity check failed to run");
    assert!(report.is_valid, "tree invalid: {:#?}", report.errors);
}
