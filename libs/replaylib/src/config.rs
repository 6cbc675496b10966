//! Recorder configuration
//!
//! Deserializable knobs for the whole synced buffer. Validation happens
//! once at construction; everything downstream trusts the figures.

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};
use crate::video::VideoRingConfig;

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    2
}

fn default_audio_duration() -> u32 {
    30
}

/// Per-stream audio format and retention. Applies to both the system and
/// microphone rings. Samples are interleaved 32-bit float.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_audio_duration")]
    pub duration_seconds: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            duration_seconds: default_audio_duration(),
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ReplayError::Config("sample_rate must be positive".into()));
        }
        if self.channels == 0 {
            return Err(ReplayError::Config("channels must be positive".into()));
        }
        if self.duration_seconds == 0 {
            return Err(ReplayError::Config(
                "audio duration_seconds must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Bytes per interleaved sample frame.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * 4
    }
}

/// Configuration for a [`SyncedAVBuffer`].
///
/// [`SyncedAVBuffer`]: crate::buffer::SyncedAVBuffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    pub video: VideoRingConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<()> {
        self.video.validate()?;
        self.audio.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_audio_defaults() {
        let audio = AudioConfig::default();
        assert_eq!(audio.sample_rate, 48_000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.bytes_per_frame(), 8);
        assert!(audio.validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "video": {
                "width": 1280,
                "height": 720,
                "fps": 60,
                "ram_seconds": 5,
                "total_seconds": 20,
                "codec_quality": 85,
                "spool_path": "/tmp/spool.bin"
            }
        }"#;
        let config: RecorderConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.video.fps, 60);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.duration_seconds, 30);
    }

    #[test]
    fn test_rejects_zero_audio_rate() {
        let config = RecorderConfig {
            video: VideoRingConfig {
                width: 64,
                height: 64,
                fps: 30,
                ram_seconds: 1,
                total_seconds: 2,
                codec_quality: 90,
                spool_path: PathBuf::from("/tmp/spool.bin"),
            },
            audio: AudioConfig {
                sample_rate: 0,
                ..AudioConfig::default()
            },
        };
        assert!(config.validate().is_err());
    }
}
