//! On-disk layout of the paged backend.
//!
//! The file starts with a [`FileHeader`] padded to `HEADER_SIZE` bytes,
//! followed by fixed-size node records. Record `n` (handles start at 1)
//! lives at `HEADER_SIZE + (n - 1) * record_size`.
//!
//! Each record is `[crc32: u32][payload length: u32][payload][zero padding]`
//! where the payload is a bincode-encoded [`NodeRecord`]. Branch records do
//! not store their child list: they point at their first child and every
//! child points at its next sibling.

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::rtree::rtree_constants::{HEADER_SIZE, MAGIC, MAX_COORDINATE_SYSTEM_LEN, VERSION};
use crate::rtree::{Entry, NodeKind, RTreeConfig, SpatialError, SpatialResult};

const RECORD_PREFIX: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum RecordKind {
    Free,
    Leaf,
    Branch,
}

impl From<NodeKind> for RecordKind {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Leaf => RecordKind::Leaf,
            NodeKind::Branch => RecordKind::Branch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct EntryRecord {
    pub coords: Vec<f64>,
    pub id: u64,
}

/// A node as stored on disk. Zero links mean "none".
///
/// For free records `next_sibling` chains the free list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct NodeRecord {
    pub kind: RecordKind,
    /// Empty while the node has no box
    pub bbox: Vec<f64>,
    pub parent: u64,
    pub first_child: u64,
    pub next_sibling: u64,
    pub child_count: u32,
    pub entries: Vec<EntryRecord>,
}

impl NodeRecord {
    pub fn free(next_free: u64) -> Self {
        Self {
            kind: RecordKind::Free,
            bbox: Vec::new(),
            parent: 0,
            first_child: 0,
            next_sibling: next_free,
            child_count: 0,
            entries: Vec::new(),
        }
    }

    pub fn bounding_box(&self) -> SpatialResult<Option<BoundingBox>> {
        if self.bbox.is_empty() {
            return Ok(None);
        }
        BoundingBox::from_coords(&self.bbox)
            .map(Some)
            .map_err(|e| SpatialError::InvalidFormat(format!("corrupt node box: {}", e)))
    }

    pub fn leaf_entries(&self) -> SpatialResult<Vec<Entry>> {
        self.entries
            .iter()
            .map(|e| {
                BoundingBox::from_coords(&e.coords)
                    .map(|bbox| Entry::new(bbox, e.id))
                    .map_err(|err| SpatialError::InvalidFormat(format!("corrupt entry box: {}", err)))
            })
            .collect()
    }
}

pub(crate) fn entry_records(entries: &[Entry]) -> Vec<EntryRecord> {
    entries
        .iter()
        .map(|e| EntryRecord {
            coords: e.bbox.coords().to_vec(),
            id: e.id,
        })
        .collect()
}

/// File header stored at the beginning of the index file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub record_size: u32,
    pub max_fan_out: u32,
    pub dimensions: u32,
    pub coordinate_system: String,
    /// Root handle (0 = empty tree)
    pub root: u64,
    pub element_count: u64,
    /// Next never-used record handle
    pub next_record: u64,
    /// First record of the free list (0 = empty)
    pub free_list_head: u64,
    pub free_records: u64,
}

impl FileHeader {
    pub fn new(config: &RTreeConfig, record_size: usize) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            record_size: record_size as u32,
            max_fan_out: config.max_fan_out as u32,
            dimensions: config.dimensions as u32,
            coordinate_system: config.coordinate_system.clone(),
            root: 0,
            element_count: 0,
            next_record: 1,
            free_list_head: 0,
            free_records: 0,
        }
    }

    /// Records that hold live nodes
    pub fn live_records(&self) -> u64 {
        (self.next_record - 1).saturating_sub(self.free_records)
    }
}

pub(crate) fn encode_header(header: &FileHeader) -> SpatialResult<Vec<u8>> {
    if header.coordinate_system.len() > MAX_COORDINATE_SYSTEM_LEN {
        return Err(SpatialError::InvalidArgument(format!(
            "coordinate system descriptor exceeds {} bytes",
            MAX_COORDINATE_SYSTEM_LEN
        )));
    }
    let mut bytes = bincode::serde::encode_to_vec(header, bincode::config::legacy())
        .map_err(|e| SpatialError::Serialization(e.to_string()))?;
    bytes.resize(HEADER_SIZE as usize, 0);
    Ok(bytes)
}

/// Decodes and validates a header block.
pub(crate) fn decode_header(bytes: &[u8]) -> SpatialResult<FileHeader> {
    let word = |at: usize| -> Option<u32> {
        bytes
            .get(at..at + 4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
    };

    match word(0) {
        Some(MAGIC) => {}
        Some(other) => {
            return Err(SpatialError::InvalidFormat(format!(
                "bad magic number {:#010x}",
                other
            )))
        }
        None => return Err(SpatialError::InvalidFormat("truncated header".into())),
    }
    match word(4) {
        Some(VERSION) => {}
        Some(other) => {
            return Err(SpatialError::InvalidFormat(format!(
                "unsupported version {} (expected {})",
                other, VERSION
            )))
        }
        None => return Err(SpatialError::InvalidFormat("truncated header".into())),
    }

    let config = bincode::config::legacy().with_limit::<{ HEADER_SIZE as usize }>();
    bincode::serde::decode_from_slice(bytes, config)
        .map(|(header, _)| header)
        .map_err(|e| SpatialError::InvalidFormat(format!("corrupt header: {}", e)))
}

/// Encodes a record and pads it to `record_size`.
pub(crate) fn encode_record(record: &NodeRecord, record_size: usize) -> SpatialResult<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(record, bincode::config::legacy())
        .map_err(|e| SpatialError::Serialization(e.to_string()))?;

    if payload.len() + RECORD_PREFIX > record_size {
        return Err(SpatialError::Serialization(format!(
            "node record too large: {} bytes (max {})",
            payload.len() + RECORD_PREFIX,
            record_size
        )));
    }

    let mut bytes = Vec::with_capacity(record_size);
    bytes.extend_from_slice(&crc32(&payload).to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes.resize(record_size, 0);
    Ok(bytes)
}

/// Verifies the checksum and decodes a record.
pub(crate) fn decode_record(bytes: &[u8]) -> SpatialResult<NodeRecord> {
    if bytes.len() < RECORD_PREFIX {
        return Err(SpatialError::InvalidFormat("truncated record".into()));
    }
    let stored = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let payload = bytes
        .get(RECORD_PREFIX..RECORD_PREFIX + len)
        .ok_or_else(|| SpatialError::InvalidFormat(format!("record length {} out of range", len)))?;

    let actual = crc32(payload);
    if stored != actual {
        return Err(SpatialError::InvalidFormat(format!(
            "record checksum mismatch (expected: {:x}, got: {:x})",
            stored, actual
        )));
    }

    bincode::serde::decode_from_slice(payload, bincode::config::legacy())
        .map(|(record, _)| record)
        .map_err(|e| SpatialError::Serialization(e.to_string()))
}

/// Size of a record slot for the given fan-out and dimensionality: the
/// encoding of a full leaf (one entry over capacity) plus the prefix, rounded
/// up to 8 bytes.
pub(crate) fn record_size_for(max_fan_out: usize, dimensions: usize) -> SpatialResult<usize> {
    let coords = vec![0.0; 2 * dimensions];
    let widest = NodeRecord {
        kind: RecordKind::Branch,
        bbox: coords.clone(),
        parent: u64::MAX,
        first_child: u64::MAX,
        next_sibling: u64::MAX,
        child_count: u32::MAX,
        entries: vec![
            EntryRecord {
                coords,
                id: u64::MAX,
            };
            max_fan_out + 1
        ],
    };
    let payload = bincode::serde::encode_to_vec(&widest, bincode::config::legacy())
        .map_err(|e| SpatialError::Serialization(e.to_string()))?;
    Ok((payload.len() + RECORD_PREFIX).div_ceil(8) * 8)
}

/// CRC32-MPEG2
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    const POLY: u32 = 0x04C1_1DB7;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_record(n: usize) -> NodeRecord {
        let entries: Vec<Entry> = (0..n)
            .map(|i| Entry::new(BoundingBox::rect(i as f64, 0.0, i as f64 + 1.0, 1.0), i as u64))
            .collect();
        NodeRecord {
            kind: RecordKind::Leaf,
            bbox: vec![0.0, 0.0, n as f64, 1.0],
            parent: 3,
            first_child: 0,
            next_sibling: 9,
            child_count: 0,
            entries: entry_records(&entries),
        }
    }

    #[test]
    fn test_record_roundtrip() {
        let size = record_size_for(4, 2).unwrap();
        assert_eq!(size % 8, 0);

        let record = leaf_record(5);
        let bytes = encode_record(&record, size).unwrap();
        assert_eq!(bytes.len(), size);

        let decoded = decode_record(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.leaf_entries().unwrap().len(), 5);
        assert_eq!(
            decoded.bounding_box().unwrap(),
            Some(BoundingBox::rect(0.0, 0.0, 5.0, 1.0))
        );
    }

    #[test]
    fn test_oversized_record_rejected() {
        let size = record_size_for(4, 2).unwrap();
        let result = encode_record(&leaf_record(12), size);
        assert!(matches!(result, Err(SpatialError::Serialization(_))));
    }

    #[test]
    fn test_corruption_detected() {
        let size = record_size_for(4, 2).unwrap();
        let mut bytes = encode_record(&leaf_record(3), size).unwrap();
        bytes[20] ^= 0xFF;
        assert!(matches!(
            decode_record(&bytes),
            Err(SpatialError::InvalidFormat(_))
        ));

        let zeroed = vec![0u8; size];
        assert!(decode_record(&zeroed).is_err());
    }

    #[test]
    fn test_record_size_grows_with_shape() {
        let small = record_size_for(4, 2).unwrap();
        assert!(record_size_for(16, 2).unwrap() > small);
        assert!(record_size_for(4, 3).unwrap() > small);
    }

    #[test]
    fn test_header_roundtrip() {
        let config = RTreeConfig::new(8, 3).with_coordinate_system("EPSG:4326");
        let mut header = FileHeader::new(&config, 256);
        header.root = 4;
        header.element_count = 77;
        header.next_record = 10;
        header.free_list_head = 6;
        header.free_records = 2;

        let bytes = encode_header(&header).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE as usize);
        let decoded = decode_header(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.live_records(), 7);
    }

    #[test]
    fn test_header_validation() {
        let header = FileHeader::new(&RTreeConfig::default(), 256);
        let mut bytes = encode_header(&header).unwrap();

        bytes[4] = 99;
        assert!(matches!(
            decode_header(&bytes),
            Err(SpatialError::InvalidFormat(_))
        ));

        bytes[0] = 0;
        let err = decode_header(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));

        assert!(decode_header(&[1, 2]).is_err());
    }

    #[test]
    fn test_crc32_known_value() {
        // CRC-32/MPEG-2 check value
        assert_eq!(crc32(b"123456789") ^ 0xFFFF_FFFF, 0x0376_E6E7);
    }
}
