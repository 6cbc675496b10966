//! Per-stream audio chunk rings
//!
//! Each audio stream (system loopback, microphone) keeps its own bounded
//! ring of timestamped PCM chunks. Chunk granularity is whatever the
//! producer delivers; the ring only guarantees chronological order and
//! bounded retention. Samples are interleaved 32-bit float, 48 kHz stereo
//! by convention.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;

/// Densest chunk cadence the ring is sized for: one chunk every 5 ms.
const MAX_CHUNKS_PER_SECOND: usize = 200;

/// Floor on the slot count so tiny windows still hold a few chunks.
const MIN_SLOTS: usize = 64;

/// One producer-sized run of PCM samples with a single timestamp.
///
/// The payload is immutable after insert, so snapshots are shallow clones.
#[derive(Clone, Debug)]
pub struct AudioChunk {
    /// Interleaved samples in the ring's declared format.
    pub data: Bytes,
    /// Capture timestamp in shared-clock ticks.
    pub ticks: i64,
    /// Sample frames in this chunk (samples per channel).
    pub sample_count: u32,
}

impl AudioChunk {
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// Bounded chronological sequence of [`AudioChunk`]s, sized by duration.
pub struct AudioRing {
    chunks: Mutex<VecDeque<AudioChunk>>,
    max_slots: usize,
    sample_rate: u32,
    channels: u16,
}

impl AudioRing {
    pub fn new(sample_rate: u32, channels: u16, duration_seconds: u32) -> Self {
        let max_slots = (duration_seconds as usize * MAX_CHUNKS_PER_SECOND).max(MIN_SLOTS);
        Self {
            chunks: Mutex::new(VecDeque::with_capacity(max_slots.min(1024))),
            max_slots,
            sample_rate,
            channels,
        }
    }

    /// Copy `pcm` into an owned chunk stamped with `ticks`, evicting the
    /// oldest chunk when the ring is full. The producer keeps ownership of
    /// its own buffer; the ring never aliases it past this call.
    pub fn add(&self, pcm: &[u8], ticks: i64) {
        let bytes_per_frame = self.channels as usize * 4;
        let chunk = AudioChunk {
            data: Bytes::copy_from_slice(pcm),
            ticks,
            sample_count: (pcm.len() / bytes_per_frame) as u32,
        };

        let mut chunks = self.chunks.lock();
        if chunks.len() >= self.max_slots {
            chunks.pop_front();
        }
        chunks.push_back(chunk);
    }

    /// All chunks in chronological order. Payloads are shared, not copied.
    pub fn snapshot(&self) -> Vec<AudioChunk> {
        self.chunks.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.chunks.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Seconds of audio currently buffered, summed over chunks.
    pub fn buffered_seconds(&self) -> f64 {
        let chunks = self.chunks.lock();
        chunks
            .iter()
            .map(|c| c.sample_count as f64 / self.sample_rate as f64)
            .sum()
    }
}
