//! Two-tier rolling video frame store
//!
//! The most recent `ram_seconds` of compressed frames live in an in-memory
//! ring; older frames spill to a memory-mapped spool file until
//! `total_seconds` of footage is retained. Producers append through
//! [`VideoRing::add`]; extraction walks both tiers oldest-to-newest and
//! streams decompressed frames into a raw sequential file.
//!
//! Eviction to disk is fire-and-forget through the writer worker so the
//! capture cadence never waits on file I/O. Extraction flushes the worker
//! while holding the memory-tier lock, which freezes both tiers into one
//! consistent snapshot: no new evictions can be queued while the lock is
//! held, because they only originate inside `add`.

pub mod config;
pub mod disk;
mod writer;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::CancelFlag;
use crate::codec::CodecCtx;
use crate::error::{ReplayError, Result};
use crate::pool::FramePool;
use disk::DiskTier;
use writer::{DiskWriter, EvictedFrame};

pub use config::VideoRingConfig;

/// Outcome of one window walk: how many frames were emitted and the closed
/// timestamp interval they span. `frame_count == 0` means the window was
/// empty and the output file must be discarded by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowResult {
    pub frame_count: usize,
    pub start_ticks: i64,
    pub end_ticks: i64,
    /// Frames inside the window that failed to decompress and were skipped.
    pub skipped_corrupt: usize,
}

/// One occupied memory-tier slot. Owns its compressed blob.
struct MemSlot {
    ticks: i64,
    original_index: i32,
    blob: Vec<u8>,
}

/// The in-memory ring of compressed frames plus insertion bookkeeping.
struct MemoryTier {
    slots: Vec<Option<MemSlot>>,
    write_index: usize,
    len: usize,
    /// Global insertion counter across both tiers.
    next_index: i64,
    newest_ticks: Option<i64>,
}

impl MemoryTier {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            write_index: 0,
            len: 0,
            next_index: 0,
            newest_ticks: None,
        }
    }

    /// Install a slot at the write position, returning the evicted occupant
    /// when the tier was full. With zero capacity the incoming slot itself
    /// is the eviction.
    fn install(&mut self, slot: MemSlot) -> Option<MemSlot> {
        let capacity = self.slots.len();
        if capacity == 0 {
            return Some(slot);
        }

        let evicted = if self.len == capacity {
            self.slots[self.write_index].take()
        } else {
            None
        };
        self.slots[self.write_index] = Some(slot);
        self.write_index = (self.write_index + 1) % capacity;
        self.len = (self.len + 1).min(capacity);
        evicted
    }

    /// Occupied slots in insertion order.
    fn oldest_first(&self) -> impl Iterator<Item = &MemSlot> + '_ {
        let capacity = self.slots.len().max(1);
        let start = (self.write_index + capacity - self.len) % capacity;
        (0..self.len).filter_map(move |i| self.slots[(start + i) % capacity].as_ref())
    }

    fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.write_index = 0;
        self.len = 0;
        self.newest_ticks = None;
        // next_index keeps counting; insertion order stays global.
    }
}

/// Two-tier circular store of compressed, timestamped frames.
pub struct VideoRing {
    config: VideoRingConfig,
    pool: Arc<FramePool>,
    /// Producer-side codec; extraction clones its own instance.
    codec: Mutex<CodecCtx>,
    mem: Mutex<MemoryTier>,
    /// Declared before `disk`: dropping joins the worker, so the tier's
    /// last owner goes away afterwards and the spool file is removed.
    writer: Option<DiskWriter>,
    disk: Option<Arc<Mutex<DiskTier>>>,
}

impl VideoRing {
    /// Build the ring, its spool file and the disk-writer worker.
    ///
    /// A spool file that cannot be created degrades the ring to memory-only
    /// operation rather than failing construction.
    pub fn new(config: VideoRingConfig, pool: Arc<FramePool>) -> Result<Self> {
        config.validate()?;
        if pool.frame_size() != config.frame_size() {
            return Err(ReplayError::Config(format!(
                "frame pool vends {} byte buffers but frames are {} bytes",
                pool.frame_size(),
                config.frame_size()
            )));
        }

        let codec = CodecCtx::new(config.width, config.height, config.codec_quality);

        let disk_capacity = config.disk_capacity_frames();
        let (disk, writer) = if disk_capacity > 0 {
            match DiskTier::create(&config.spool_path, disk_capacity, config.disk_stride()) {
                Ok(tier) => {
                    let tier = Arc::new(Mutex::new(tier));
                    let writer = DiskWriter::spawn(Arc::clone(&tier));
                    (Some(tier), Some(writer))
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %config.spool_path.display(),
                        "disk tier allocation failed, continuing memory-only"
                    );
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        tracing::info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            ram_frames = config.ram_capacity_frames(),
            disk_frames = if disk.is_some() { disk_capacity } else { 0 },
            "video ring ready"
        );

        Ok(Self {
            mem: Mutex::new(MemoryTier::with_capacity(config.ram_capacity_frames())),
            codec: Mutex::new(codec),
            pool,
            writer,
            disk,
            config,
        })
    }

    pub fn config(&self) -> &VideoRingConfig {
        &self.config
    }

    /// Append one raw BGRA frame stamped with `ticks`.
    ///
    /// The pixels are copied out and compressed before the ring lock is
    /// taken; the caller's buffer is never retained. When the memory tier is
    /// full its oldest frame moves to the disk-writer queue (or is dropped
    /// in memory-only operation).
    pub fn add(&self, raw: &[u8], ticks: i64) -> Result<()> {
        if raw.len() != self.config.frame_size() {
            return Err(ReplayError::Config(format!(
                "producer delivered {} bytes, expected {}",
                raw.len(),
                self.config.frame_size()
            )));
        }

        let mut scratch = self.pool.rent();
        scratch.copy_from_slice(raw);

        let mut blob = Vec::new();
        let compressed = self.codec.lock().compress(&scratch, &mut blob);
        self.pool.release(scratch);
        compressed?;

        let mut mem = self.mem.lock();
        if let Some(newest) = mem.newest_ticks {
            if ticks < newest {
                tracing::debug!(ticks, newest, "frame timestamp regressed, keeping insertion order");
            }
        }
        let original_index = mem.next_index as i32;
        mem.next_index += 1;
        mem.newest_ticks = Some(mem.newest_ticks.map_or(ticks, |n| n.max(ticks)));

        let evicted = mem.install(MemSlot {
            ticks,
            original_index,
            blob,
        });

        if let (Some(evicted), Some(writer)) = (evicted, self.writer.as_ref()) {
            writer.enqueue(EvictedFrame {
                ticks: evicted.ticks,
                original_index: evicted.original_index,
                blob: evicted.blob,
            });
        }
        Ok(())
    }

    /// Decompress every frame with `ticks >= window_start_ticks` into
    /// `out_path` as concatenated raw BGRA, oldest first.
    ///
    /// Holds the ring for the whole walk; producers block until it returns.
    /// Corrupted frames are skipped and counted. On cancellation the partial
    /// output is left for the caller to delete along with the returned
    /// error.
    pub fn write_window_to_raw_file(
        &self,
        out_path: &Path,
        window_start_ticks: i64,
        cancel: &CancelFlag,
    ) -> Result<WindowResult> {
        let mut codec = self.codec.lock().clone();

        let mem = self.mem.lock();
        // Freeze the snapshot: queued evictions land before we walk, and no
        // new ones can be queued while we hold the memory tier.
        if let Some(writer) = &self.writer {
            writer.flush();
        }

        let file = File::create(out_path)?;
        let mut sink = BufWriter::with_capacity(1 << 20, file);
        let mut scratch = self.pool.rent();

        let mut result = WindowResult {
            frame_count: 0,
            start_ticks: 0,
            end_ticks: 0,
            skipped_corrupt: 0,
        };

        if let Some(disk) = &self.disk {
            let tier = disk.lock();
            for (meta, payload) in tier.oldest_first() {
                if cancel.is_cancelled() {
                    return Err(ReplayError::Cancelled);
                }
                if !meta.valid || meta.ticks < window_start_ticks {
                    continue;
                }
                let Some(blob_len) = codec.delimited_len(payload) else {
                    result.skipped_corrupt += 1;
                    tracing::warn!(ticks = meta.ticks, "disk slot has no end marker, skipped");
                    continue;
                };
                Self::emit_frame(
                    &mut codec,
                    &payload[..blob_len],
                    meta.ticks,
                    &mut sink,
                    &mut scratch,
                    &mut result,
                )?;
            }
        }

        for slot in mem.oldest_first() {
            if cancel.is_cancelled() {
                return Err(ReplayError::Cancelled);
            }
            if slot.ticks < window_start_ticks {
                continue;
            }
            Self::emit_frame(
                &mut codec,
                &slot.blob,
                slot.ticks,
                &mut sink,
                &mut scratch,
                &mut result,
            )?;
        }

        sink.flush()?;
        self.pool.release(scratch);

        tracing::debug!(
            frames = result.frame_count,
            skipped = result.skipped_corrupt,
            "window written"
        );
        Ok(result)
    }

    fn emit_frame(
        codec: &mut CodecCtx,
        blob: &[u8],
        ticks: i64,
        sink: &mut BufWriter<File>,
        scratch: &mut [u8],
        result: &mut WindowResult,
    ) -> Result<()> {
        match codec.decompress_into(blob, scratch) {
            Ok(()) => {
                sink.write_all(scratch)?;
                if result.frame_count == 0 {
                    result.start_ticks = ticks;
                }
                result.end_ticks = ticks;
                result.frame_count += 1;
                Ok(())
            }
            Err(e) => {
                result.skipped_corrupt += 1;
                tracing::warn!(error = %e, ticks, "corrupted frame skipped during extraction");
                Ok(())
            }
        }
    }

    /// Retire every frame in both tiers. The spool file keeps its size.
    pub fn clear(&self) {
        let mut mem = self.mem.lock();
        if let Some(writer) = &self.writer {
            writer.flush();
        }
        mem.clear();
        if let Some(disk) = &self.disk {
            disk.lock().clear();
        }
    }

    /// Frames currently retained across both tiers. Queued evictions in
    /// flight to the writer are counted with the disk tier they are bound
    /// for only after they land; this is a status figure, not a snapshot.
    pub fn frame_count(&self) -> usize {
        let mem = self.mem.lock();
        let disk = self.disk.as_ref().map_or(0, |d| d.lock().count());
        mem.len + disk
    }

    /// Timestamps of the newest and oldest retained frames, if any.
    pub fn ticks_span(&self) -> Option<(i64, i64)> {
        let mem = self.mem.lock();
        let newest = mem.newest_ticks?;
        let oldest_disk = self
            .disk
            .as_ref()
            .and_then(|d| d.lock().oldest_first().find(|(m, _)| m.valid).map(|(m, _)| m.ticks));
        let oldest = oldest_disk.or_else(|| mem.oldest_first().next().map(|s| s.ticks))?;
        Some((oldest, newest))
    }

    #[cfg(test)]
    pub(crate) fn flush_disk_for_test(&self) {
        if let Some(writer) = &self.writer {
            writer.flush();
        }
    }

    #[cfg(test)]
    pub(crate) fn mem_ticks_for_test(&self) -> Vec<i64> {
        self.mem.lock().oldest_first().map(|s| s.ticks).collect()
    }

    #[cfg(test)]
    pub(crate) fn disk_ticks_for_test(&self) -> Vec<i64> {
        self.disk
            .as_ref()
            .map(|d| {
                d.lock()
                    .oldest_first()
                    .filter(|(m, _)| m.valid)
                    .map(|(m, _)| m.ticks)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Overwrite the blob of the `nth` oldest memory slot with garbage.
    #[cfg(test)]
    pub(crate) fn corrupt_mem_slot_for_test(&self, nth: usize) {
        let mut mem = self.mem.lock();
        let capacity = mem.slots.len().max(1);
        let start = (mem.write_index + capacity - mem.len) % capacity;
        let idx = (start + nth) % capacity;
        if let Some(slot) = mem.slots[idx].as_mut() {
            slot.blob = vec![0xAB; 64];
        }
    }
}
