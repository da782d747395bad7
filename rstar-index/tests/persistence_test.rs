//! File-backed trees: reopening, fidelity against the in-memory backend and
//! rejection of foreign or damaged files.

mod common;

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use common::{assert_valid, brute_force, ids, random_entries, random_region, TestContext};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rstar_index::rtree::rtree_constants::HEADER_SIZE;
use rstar_index::{BoundingBox, Entry, PagedOptions, RTree, RTreeConfig, SpatialError};

#[test]
fn test_paged_matches_memory_after_reopen() {
    let ctx = TestContext::new();
    let path = ctx.path("fidelity.rtree");
    let entries = random_entries(17, 2500, 1000.0, 15.0);
    let config = RTreeConfig::new(8, 2);

    let mut memory = RTree::in_memory(config.clone()).unwrap();
    let mut paged = RTree::create(&path, config).unwrap();
    for entry in &entries {
        memory.insert(entry.clone()).unwrap();
        paged.insert(entry.clone()).unwrap();
    }
    for entry in entries.iter().step_by(7) {
        assert!(memory.remove(entry).unwrap());
        assert!(paged.remove(entry).unwrap());
    }
    paged.close().unwrap();

    let reopened = RTree::open(&path).unwrap();
    assert_eq!(reopened.len(), memory.len());
    assert_valid(&reopened);

    let mut rng = StdRng::seed_from_u64(4);
    for _ in 0..100 {
        let region = random_region(&mut rng, 1000.0);
        let from_file = ids(&reopened.find_intersecting(&region).unwrap());
        assert_eq!(from_file, ids(&memory.find_intersecting(&region).unwrap()));
    }
    assert_eq!(ids(&reopened.entries().unwrap()), ids(&memory.entries().unwrap()));
}

#[test]
fn test_reopened_tree_accepts_updates() {
    let ctx = TestContext::new();
    let path = ctx.path("updates.rtree");
    let first = random_entries(1, 600, 300.0, 5.0);
    {
        let mut tree = RTree::create(&path, RTreeConfig::new(6, 2)).unwrap();
        tree.bulk_insert(first.clone()).unwrap();
        tree.close().unwrap();
    }

    let second: Vec<Entry> = random_entries(2, 400, 300.0, 5.0)
        .into_iter()
        .map(|e| Entry::new(e.bbox, e.id + 10_000))
        .collect();
    {
        let mut tree = RTree::open(&path).unwrap();
        for entry in &second {
            tree.insert(entry.clone()).unwrap();
        }
        for entry in &first[..300] {
            assert!(tree.remove(entry).unwrap());
        }
        tree.close().unwrap();
    }

    let tree = RTree::open(&path).unwrap();
    assert_valid(&tree);
    let mut expected: Vec<Entry> = first[300..].to_vec();
    expected.extend(second);
    assert_eq!(ids(&tree.entries().unwrap()), ids(&expected));

    let region = BoundingBox::rect(50.0, 50.0, 150.0, 120.0);
    assert_eq!(ids(&tree.find_intersecting(&region).unwrap()), brute_force(&expected, &region));
}

#[test]
fn test_drop_flushes_pending_writes() {
    let ctx = TestContext::new();
    let path = ctx.path("dropped.rtree");
    {
        let mut tree = RTree::create(&path, RTreeConfig::new(4, 2)).unwrap();
        for entry in random_entries(3, 200, 50.0, 2.0) {
            tree.insert(entry).unwrap();
        }
    }

    let tree = RTree::open(&path).unwrap();
    assert_eq!(tree.len(), 200);
    assert_valid(&tree);
}

#[test]
fn test_freed_records_are_reused() {
    let ctx = TestContext::new();
    let path = ctx.path("reuse.rtree");
    let entries = random_entries(9, 1500, 400.0, 6.0);

    let mut tree = RTree::create(&path, RTreeConfig::new(8, 2)).unwrap();
    for entry in &entries {
        tree.insert(entry.clone()).unwrap();
    }
    for entry in &entries {
        assert!(tree.remove(entry).unwrap());
    }
    assert_eq!(tree.stats().unwrap().node_count, 0);
    tree.close().unwrap();
    let emptied = fs::metadata(&path).unwrap().len();

    let mut tree = RTree::open(&path).unwrap();
    for entry in &entries {
        tree.insert(entry.clone()).unwrap();
    }
    tree.close().unwrap();

    assert!(fs::metadata(&path).unwrap().len() <= emptied);
    let tree = RTree::open(&path).unwrap();
    assert_eq!(tree.len(), 1500);
    assert_valid(&tree);
}

#[test]
fn test_small_buffer_spills_to_disk() {
    let ctx = TestContext::new();
    let path = ctx.path("spill.rtree");
    let options = PagedOptions::with_buffer_size(1);
    let entries = random_entries(12, 1200, 500.0, 10.0);

    let mut tree = RTree::create_with_options(&path, RTreeConfig::new(6, 2), options).unwrap();
    for entry in &entries {
        tree.insert(entry.clone()).unwrap();
    }
    let stats = tree.stats().unwrap();
    assert!(stats.cached_records <= 16);
    assert!(stats.disk_writes > 0);
    assert!(stats.cache_misses > 0);

    assert_valid(&tree);
    let region = BoundingBox::rect(100.0, 100.0, 250.0, 300.0);
    assert_eq!(ids(&tree.find_intersecting(&region).unwrap()), brute_force(&entries, &region));
}

#[test]
fn test_foreign_file_rejected() {
    let ctx = TestContext::new();

    let garbage = ctx.path("garbage.rtree");
    fs::write(&garbage, vec![0x5Au8; 4096]).unwrap();
    match RTree::open(&garbage) {
        Err(e @ SpatialError::InvalidFormat(_)) => assert!(e.is_storage_failure()),
        other => panic!("expected InvalidFormat, got {:?}", other.err()),
    }

    let short = ctx.path("short.rtree");
    fs::write(&short, b"RSTR").unwrap();
    assert!(matches!(RTree::open(&short), Err(SpatialError::InvalidFormat(_))));

    match RTree::open(ctx.path("missing.rtree")) {
        Err(e @ SpatialError::Io(_)) => assert!(e.is_storage_failure()),
        other => panic!("expected Io, got {:?}", other.err()),
    }
}

#[test]
fn test_version_mismatch_rejected() {
    let ctx = TestContext::new();
    let path = ctx.path("version.rtree");
    {
        let mut tree = RTree::create(&path, RTreeConfig::new(4, 2)).unwrap();
        tree.insert(Entry::new(BoundingBox::rect(0.0, 0.0, 1.0, 1.0), 1)).unwrap();
        tree.close().unwrap();
    }

    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(4)).unwrap();
    file.write_all(&99u32.to_le_bytes()).unwrap();
    drop(file);

    match RTree::open(&path) {
        Err(SpatialError::InvalidFormat(message)) => assert!(message.contains("version")),
        other => panic!("expected InvalidFormat, got {:?}", other.err()),
    }
}

#[test]
fn test_damaged_record_detected() {
    let ctx = TestContext::new();
    let path = ctx.path("damaged.rtree");
    {
        let mut tree = RTree::create(&path, RTreeConfig::new(4, 2)).unwrap();
        for entry in random_entries(5, 50, 20.0, 1.0) {
            tree.insert(entry).unwrap();
        }
        tree.close().unwrap();
    }

    // Flip a payload byte of the first record
    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    let at = HEADER_SIZE + 12;
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(at)).unwrap();
    file.read_exact(&mut byte).unwrap();
    file.seek(SeekFrom::Start(at)).unwrap();
    file.write_all(&[byte[0] ^ 0xFF]).unwrap();
    drop(file);

    let result = RTree::open(&path).and_then(|tree| tree.entries());
    match result {
        Err(e @ SpatialError::InvalidFormat(_)) => assert!(e.is_storage_failure()),
        other => panic!("expected InvalidFormat, got {:?}", other.map(|v| v.len())),
    }
}

#[test]
fn test_closed_tree_rejects_operations() {
    let ctx = TestContext::new();
    let path = ctx.path("closed.rtree");
    let mut tree = RTree::create(&path, RTreeConfig::new(4, 2)).unwrap();
    let entry = Entry::new(BoundingBox::rect(1.0, 1.0, 2.0, 2.0), 1);
    tree.insert(entry.clone()).unwrap();
    tree.close().unwrap();
    tree.close().unwrap();

    assert!(matches!(tree.insert(entry.clone()), Err(SpatialError::Closed)));
    assert!(matches!(tree.remove(&entry), Err(SpatialError::Closed)));
    assert!(matches!(tree.find_intersecting(&entry.bbox), Err(SpatialError::Closed)));
    assert!(matches!(tree.find_nearest(&[0.0, 0.0], 1, None), Err(SpatialError::Closed)));
    assert!(matches!(tree.clear(), Err(SpatialError::Closed)));
    assert!(matches!(tree.stats(), Err(SpatialError::Closed)));

    // The data written before closing is intact
    let reopened = RTree::open(&path).unwrap();
    assert_eq!(reopened.entries().unwrap(), vec![entry]);
    assert!(ctx.dir().exists());
}

#[test]
fn test_clear_truncates_file() {
    let ctx = TestContext::new();
    let path = ctx.path("cleared.rtree");
    let mut tree = RTree::create(&path, RTreeConfig::new(4, 2)).unwrap();
    for entry in random_entries(8, 300, 100.0, 3.0) {
        tree.insert(entry).unwrap();
    }
    tree.flush().unwrap();
    assert!(fs::metadata(&path).unwrap().len() > HEADER_SIZE);

    tree.clear().unwrap();
    tree.flush().unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_SIZE);
    assert!(tree.is_empty());

    tree.insert(Entry::new(BoundingBox::rect(0.0, 0.0, 1.0, 1.0), 1)).unwrap();
    tree.close().unwrap();
    assert_eq!(RTree::open(&path).unwrap().len(), 1);
}
