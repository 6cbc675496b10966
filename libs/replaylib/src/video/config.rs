//! Video ring configuration and derived sizing

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::codec::CODEC_OVERHEAD_BYTES;
use crate::error::{ReplayError, Result};
use crate::video::disk::METADATA_BYTES;

/// Construction-time configuration of a [`VideoRing`].
///
/// All values are fixed for the life of the ring. `ram_seconds` of the most
/// recent footage stay in process memory; the remainder up to
/// `total_seconds` spills to the memory-mapped file at `spool_path`.
///
/// [`VideoRing`]: crate::video::VideoRing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRingConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub ram_seconds: u32,
    pub total_seconds: u32,
    /// JPEG quality factor, 1..=100.
    pub codec_quality: u8,
    /// Backing file for the disk tier. Created on construction, deleted on
    /// drop. Unused when `total_seconds == ram_seconds`.
    pub spool_path: PathBuf,
}

impl VideoRingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReplayError::Config(format!(
                "frame dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(ReplayError::Config("fps must be positive".into()));
        }
        if self.ram_seconds > self.total_seconds {
            return Err(ReplayError::Config(format!(
                "ram_seconds ({}) exceeds total_seconds ({})",
                self.ram_seconds, self.total_seconds
            )));
        }
        if self.total_seconds == 0 {
            return Err(ReplayError::Config("total_seconds must be positive".into()));
        }
        if self.codec_quality == 0 || self.codec_quality > 100 {
            return Err(ReplayError::Config(format!(
                "codec_quality must be in 1..=100, got {}",
                self.codec_quality
            )));
        }
        Ok(())
    }

    /// Bytes in one raw BGRA frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Hard bound on one compressed blob.
    pub fn max_compressed_size(&self) -> usize {
        self.width as usize * self.height as usize * 3 / 2 + CODEC_OVERHEAD_BYTES
    }

    /// Slots in the memory tier.
    pub fn ram_capacity_frames(&self) -> usize {
        (self.fps * self.ram_seconds) as usize
    }

    /// Slots in the disk tier; zero disables it.
    pub fn disk_capacity_frames(&self) -> usize {
        (self.fps * (self.total_seconds - self.ram_seconds)) as usize
    }

    /// Byte stride of one disk-tier slot.
    pub fn disk_stride(&self) -> usize {
        METADATA_BYTES + self.max_compressed_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> VideoRingConfig {
        VideoRingConfig {
            width: 1920,
            height: 1080,
            fps: 60,
            ram_seconds: 5,
            total_seconds: 30,
            codec_quality: 90,
            spool_path: PathBuf::from("/tmp/replay_spool.bin"),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_derived_sizes() {
        let cfg = base();
        assert_eq!(cfg.frame_size(), 1920 * 1080 * 4);
        assert_eq!(
            cfg.max_compressed_size(),
            1920 * 1080 * 3 / 2 + CODEC_OVERHEAD_BYTES
        );
        assert_eq!(cfg.ram_capacity_frames(), 300);
        assert_eq!(cfg.disk_capacity_frames(), 1500);
        assert_eq!(cfg.disk_stride(), METADATA_BYTES + cfg.max_compressed_size());
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        let mut cfg = base();
        cfg.width = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_ram_exceeding_total() {
        let mut cfg = base();
        cfg.ram_seconds = 60;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_quality() {
        let mut cfg = base();
        cfg.codec_quality = 0;
        assert!(cfg.validate().is_err());
        cfg.codec_quality = 101;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_memory_only_config_has_no_disk_tier() {
        let mut cfg = base();
        cfg.ram_seconds = 30;
        cfg.total_seconds = 30;
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.disk_capacity_frames(), 0);
    }
}
