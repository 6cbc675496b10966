//! Memory-mapped disk tier
//!
//! A single pre-sized file split into fixed-stride slots. Each slot carries
//! a small packed metadata header followed by one variable-length
//! compressed blob and padding; the uniform stride gives O(1) indexed
//! addressing, and blob length is recovered from the codec's end marker on
//! read. The file never grows or shrinks after creation.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

/// Bytes of packed metadata at the head of each slot:
/// `{ timestamp: i64, original_index: i32, valid: u8, 3 bytes padding }`,
/// little-endian.
pub const METADATA_BYTES: usize = 16;

/// Decoded slot header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMeta {
    pub ticks: i64,
    pub original_index: i32,
    pub valid: bool,
}

impl SlotMeta {
    fn encode(&self) -> [u8; METADATA_BYTES] {
        let mut out = [0u8; METADATA_BYTES];
        out[0..8].copy_from_slice(&self.ticks.to_le_bytes());
        out[8..12].copy_from_slice(&self.original_index.to_le_bytes());
        out[12] = self.valid as u8;
        out
    }

    fn decode(raw: &[u8]) -> Self {
        Self {
            ticks: i64::from_le_bytes(raw[0..8].try_into().unwrap()),
            original_index: i32::from_le_bytes(raw[8..12].try_into().unwrap()),
            valid: raw[12] != 0,
        }
    }
}

/// Fixed-stride circular slot file for evicted compressed frames.
///
/// One writer (the disk-writer worker) owns the cursor; readers walk
/// oldest-to-newest under the same external lock that serializes writes.
pub struct DiskTier {
    map: MmapMut,
    path: PathBuf,
    stride: usize,
    capacity: usize,
    /// Total slots ever written; the next write lands at `cursor % capacity`.
    cursor: u64,
    /// Valid slots, saturating at `capacity`.
    count: usize,
}

impl DiskTier {
    /// Create (or truncate) the backing file at `path` with room for
    /// `capacity` slots of `stride` bytes each, and map it.
    pub fn create(path: &Path, capacity: usize, stride: usize) -> io::Result<Self> {
        assert!(capacity > 0, "disk tier requires at least one slot");
        assert!(stride > METADATA_BYTES, "slot stride must exceed the header");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((capacity * stride) as u64)?;

        let map = unsafe { MmapOptions::new().map_mut(&file)? };

        tracing::debug!(
            path = %path.display(),
            capacity,
            stride,
            size_mb = (capacity * stride) as f64 / (1024.0 * 1024.0),
            "created disk tier"
        );

        Ok(Self {
            map,
            path: path.to_path_buf(),
            stride,
            capacity,
            cursor: 0,
            count: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn file_len(&self) -> usize {
        self.map.len()
    }

    /// Write one evicted frame into the next slot, overwriting in place once
    /// the cursor wraps. `blob` must fit within the slot payload.
    pub fn write(&mut self, ticks: i64, original_index: i32, blob: &[u8]) -> io::Result<()> {
        if blob.len() > self.stride - METADATA_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "blob of {} bytes exceeds slot payload of {}",
                    blob.len(),
                    self.stride - METADATA_BYTES
                ),
            ));
        }

        let slot = (self.cursor % self.capacity as u64) as usize;
        let offset = slot * self.stride;

        let meta = SlotMeta {
            ticks,
            original_index,
            valid: true,
        };
        self.map[offset..offset + METADATA_BYTES].copy_from_slice(&meta.encode());
        self.map[offset + METADATA_BYTES..offset + METADATA_BYTES + blob.len()]
            .copy_from_slice(blob);

        self.cursor += 1;
        self.count = (self.count + 1).min(self.capacity);
        Ok(())
    }

    /// Walk the valid slots oldest-to-newest, yielding each header with the
    /// full slot payload (blob plus padding).
    pub fn oldest_first(&self) -> impl Iterator<Item = (SlotMeta, &[u8])> + '_ {
        let start = self.cursor - self.count as u64;
        (0..self.count as u64).map(move |i| {
            let slot = ((start + i) % self.capacity as u64) as usize;
            let offset = slot * self.stride;
            let meta = SlotMeta::decode(&self.map[offset..offset + METADATA_BYTES]);
            let payload = &self.map[offset + METADATA_BYTES..offset + self.stride];
            (meta, payload)
        })
    }

    /// Retire all slots. Slot payloads stay in place; headers are marked
    /// invalid and the cursor resets. The file keeps its size.
    pub fn clear(&mut self) {
        for slot in 0..self.capacity {
            let offset = slot * self.stride;
            // valid flag sits after the 12 header value bytes
            self.map[offset + 12] = 0;
        }
        self.cursor = 0;
        self.count = 0;
    }
}

impl Drop for DiskTier {
    fn drop(&mut self) {
        // Best-effort removal of the spool file.
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "spool file not removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_tier(capacity: usize, stride: usize) -> (tempfile::TempDir, DiskTier) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.bin");
        let tier = DiskTier::create(&path, capacity, stride).unwrap();
        (dir, tier)
    }

    #[test]
    fn test_meta_round_trip() {
        let meta = SlotMeta {
            ticks: -123456789,
            original_index: 42,
            valid: true,
        };
        assert_eq!(SlotMeta::decode(&meta.encode()), meta);
    }

    #[test]
    fn test_file_size_is_fixed() {
        let (_dir, tier) = temp_tier(8, 128);
        assert_eq!(tier.file_len(), 8 * 128);
    }

    #[test]
    fn test_write_and_walk_in_order() {
        let (_dir, mut tier) = temp_tier(4, 64);
        for i in 0..3i64 {
            tier.write(i * 10, i as i32, &[i as u8; 8]).unwrap();
        }

        let slots: Vec<_> = tier.oldest_first().collect();
        assert_eq!(slots.len(), 3);
        for (i, (meta, payload)) in slots.iter().enumerate() {
            assert!(meta.valid);
            assert_eq!(meta.ticks, i as i64 * 10);
            assert_eq!(meta.original_index, i as i32);
            assert_eq!(&payload[..8], &[i as u8; 8]);
        }
    }

    #[test]
    fn test_wrap_overwrites_oldest() {
        let (_dir, mut tier) = temp_tier(3, 64);
        for i in 0..5i64 {
            tier.write(i, i as i32, &[i as u8; 4]).unwrap();
        }

        assert_eq!(tier.count(), 3);
        let ticks: Vec<_> = tier.oldest_first().map(|(m, _)| m.ticks).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
    }

    #[test]
    fn test_rejects_oversized_blob() {
        let (_dir, mut tier) = temp_tier(2, 64);
        let too_big = vec![0u8; 64 - METADATA_BYTES + 1];
        assert!(tier.write(0, 0, &too_big).is_err());
    }

    #[test]
    fn test_clear_retires_slots() {
        let (_dir, mut tier) = temp_tier(4, 64);
        tier.write(1, 0, &[1]).unwrap();
        tier.write(2, 1, &[2]).unwrap();

        tier.clear();
        assert_eq!(tier.count(), 0);
        assert_eq!(tier.oldest_first().count(), 0);
        // Size unchanged by clear.
        assert_eq!(tier.file_len(), 4 * 64);
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.bin");
        {
            let _tier = DiskTier::create(&path, 2, 64).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
