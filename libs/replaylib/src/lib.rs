//! # replaylib - Rolling A/V replay buffer with on-demand clip extraction
//!
//! A headless core for "press a key, keep the last N seconds": producers
//! feed raw screen frames and PCM audio stamped from one shared clock, the
//! buffer retains a bounded rolling window of compressed material, and an
//! extraction call materializes the trailing window as a raw video file
//! plus timestamp-filtered audio lists for an external encoder.
//!
//! ## Architecture
//!
//! ```text
//! producers ──> SyncedAVBuffer
//!                 ├─ VideoRing      memory tier + mmap'd disk tier
//!                 │    └─ disk-writer worker (async eviction)
//!                 ├─ AudioRing x2   system loopback + microphone
//!                 └─ Clock          shared tick domain
//!
//! extract_last_seconds(n) ──> raw BGRA file + audio chunk lists
//!                               └─> EncoderJob (external ffmpeg)
//! ```
//!
//! Capture backends, hotkeys and UI live outside this crate; the core only
//! sees `add_*` calls and an extraction request.

pub mod audio;
pub mod buffer;
pub mod clock;
pub mod codec;
pub mod config;
pub mod encoder;
pub mod error;
pub mod pool;
pub mod sync;
pub mod video;

pub use audio::{AudioChunk, AudioRing};
pub use buffer::{CancelFlag, ExtractResult, SyncedAVBuffer, END_MARGIN_SECONDS};
pub use clock::{Clock, ManualClock, MonotonicClock, NANOS_PER_SECOND};
pub use codec::CodecCtx;
pub use config::{AudioConfig, RecorderConfig};
pub use encoder::{EncoderJob, EncoderSettings};
pub use error::{CodecError, ReplayError, Result};
pub use pool::FramePool;
pub use sync::{
    are_synchronized, chunk_in_window, observed_rate, timestamp_delta_ms,
    DEFAULT_SYNC_TOLERANCE_MS,
};
pub use video::{VideoRing, VideoRingConfig, WindowResult};
