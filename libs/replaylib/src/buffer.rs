//! Synchronized A/V buffer and clip extraction
//!
//! One video ring and two audio rings (system loopback, microphone) share a
//! single clock domain. Producers forward timestamped data through the
//! `add_*` entry points; a hotkey service calls [`extract_last_seconds`] to
//! materialize the trailing window as a raw video file plus filtered audio
//! chunk lists, ready for an external encoder.
//!
//! Video defines the extraction window: it is the coarser stream and its
//! boundaries correspond to visible content. Audio is filtered to the video
//! bounds, never padded; chunks that start within a small margin after the
//! last frame are kept so the final spanning chunk survives.
//!
//! [`extract_last_seconds`]: SyncedAVBuffer::extract_last_seconds

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::audio::{AudioChunk, AudioRing};
use crate::clock::Clock;
use crate::config::RecorderConfig;
use crate::error::{ReplayError, Result};
use crate::pool::FramePool;
use crate::sync;
use crate::video::VideoRing;

/// Tolerance past the last video frame within which audio chunks are kept.
pub const END_MARGIN_SECONDS: f64 = 0.1;

/// Raw-frame buffers kept around: producer scratch, extraction scratch and
/// slack for hand-off overlap.
const POOL_SLOTS: usize = 4;

/// Cloneable cancellation signal for an in-flight extraction.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything an external encoder needs for one clip.
///
/// The caller owns `video_path` and is responsible for deleting it once the
/// encoder has consumed it. An empty window is reported with
/// `frame_count == 0` and no path.
#[derive(Debug, Clone)]
pub struct ExtractResult {
    /// Raw sequential BGRA file, `frame_count * width * height * 4` bytes.
    pub video_path: Option<PathBuf>,
    pub frame_count: usize,
    pub start_ticks: i64,
    pub end_ticks: i64,
    pub width: u32,
    pub height: u32,
    /// `end - start` of the emitted window, in seconds.
    pub duration_seconds: f64,
    /// Average input rate observed over the window, for the encoder's
    /// input-rate parameter.
    pub observed_fps: f64,
    pub system_audio: Vec<AudioChunk>,
    pub microphone_audio: Vec<AudioChunk>,
}

impl ExtractResult {
    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }
}

/// Resets the extraction guard even on early return.
struct ExtractGuard<'a>(&'a AtomicBool);

impl Drop for ExtractGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Rolling audiovisual window with on-demand clip extraction.
pub struct SyncedAVBuffer {
    clock: Arc<dyn Clock>,
    video: VideoRing,
    system_audio: AudioRing,
    microphone: AudioRing,
    extracting: AtomicBool,
}

impl SyncedAVBuffer {
    pub fn new(config: RecorderConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(FramePool::new(config.video.frame_size(), POOL_SLOTS));
        pool.prewarm(2);
        let video = VideoRing::new(config.video, pool)?;

        let audio = &config.audio;
        Ok(Self {
            video,
            system_audio: AudioRing::new(
                audio.sample_rate,
                audio.channels,
                audio.duration_seconds,
            ),
            microphone: AudioRing::new(audio.sample_rate, audio.channels, audio.duration_seconds),
            clock,
            extracting: AtomicBool::new(false),
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Append one raw BGRA frame. Producer-path failures are absorbed and
    /// logged: dropping a frame is always preferable to jeopardizing the
    /// capture cadence.
    pub fn add_video_frame(&self, raw: &[u8], ticks: i64) {
        if let Err(e) = self.video.add(raw, ticks) {
            tracing::warn!(error = %e, ticks, "video frame dropped");
        }
    }

    pub fn add_system_audio(&self, pcm: &[u8], ticks: i64) {
        self.system_audio.add(pcm, ticks);
    }

    pub fn add_microphone_audio(&self, pcm: &[u8], ticks: i64) {
        self.microphone.add(pcm, ticks);
    }

    /// Extract the trailing `seconds` of footage into `out_dir`.
    ///
    /// See [`extract_last_seconds_with_cancel`]; this variant cannot be
    /// cancelled.
    ///
    /// [`extract_last_seconds_with_cancel`]: SyncedAVBuffer::extract_last_seconds_with_cancel
    pub fn extract_last_seconds(&self, seconds: f64, out_dir: &Path) -> Result<ExtractResult> {
        self.extract_last_seconds_with_cancel(seconds, out_dir, &CancelFlag::new())
    }

    /// Extract the trailing `seconds` of footage into a fresh
    /// `video_raw_{uuid}.bin` under `out_dir` and filter both audio rings to
    /// the emitted video window.
    ///
    /// The requested duration is an upper bound: the window shrinks to
    /// whatever the rings have accumulated. A second extraction while one is
    /// in flight fails with [`ReplayError::Busy`]. On cancellation or error
    /// the temp file is deleted before returning.
    pub fn extract_last_seconds_with_cancel(
        &self,
        seconds: f64,
        out_dir: &Path,
        cancel: &CancelFlag,
    ) -> Result<ExtractResult> {
        if self.extracting.swap(true, Ordering::SeqCst) {
            return Err(ReplayError::Busy);
        }
        let _guard = ExtractGuard(&self.extracting);

        let target_start = self.clock.now_ticks() - self.clock.seconds_to_ticks(seconds);
        let temp_path = out_dir.join(format!("video_raw_{}.bin", Uuid::new_v4()));
        tracing::info!(seconds, path = %temp_path.display(), "extracting trailing window");

        let win = match self
            .video
            .write_window_to_raw_file(&temp_path, target_start, cancel)
        {
            Ok(win) => win,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        };

        let config = self.video.config();
        if win.frame_count == 0 {
            let _ = fs::remove_file(&temp_path);
            tracing::debug!("window empty, no clip produced");
            return Ok(ExtractResult {
                video_path: None,
                frame_count: 0,
                start_ticks: 0,
                end_ticks: 0,
                width: config.width,
                height: config.height,
                duration_seconds: 0.0,
                observed_fps: 0.0,
                system_audio: Vec::new(),
                microphone_audio: Vec::new(),
            });
        }

        // Audio before the first frame is discarded, never padded; chunks up
        // to the margin past the last frame keep the spanning tail.
        let margin = self.clock.seconds_to_ticks(END_MARGIN_SECONDS);
        let system_audio: Vec<AudioChunk> = self
            .system_audio
            .snapshot()
            .into_iter()
            .filter(|c| sync::chunk_in_window(c.ticks, win.start_ticks, win.end_ticks, margin))
            .collect();
        let microphone_audio: Vec<AudioChunk> = self
            .microphone
            .snapshot()
            .into_iter()
            .filter(|c| sync::chunk_in_window(c.ticks, win.start_ticks, win.end_ticks, margin))
            .collect();

        let duration_seconds = self.clock.ticks_to_seconds(win.end_ticks - win.start_ticks);
        let observed_fps = sync::observed_rate(
            win.frame_count,
            win.start_ticks,
            win.end_ticks,
            self.clock.ticks_per_second(),
            config.fps as f64,
        );

        tracing::info!(
            frames = win.frame_count,
            duration_seconds,
            system_chunks = system_audio.len(),
            microphone_chunks = microphone_audio.len(),
            "clip window ready"
        );

        Ok(ExtractResult {
            video_path: Some(temp_path),
            frame_count: win.frame_count,
            start_ticks: win.start_ticks,
            end_ticks: win.end_ticks,
            width: config.width,
            height: config.height,
            duration_seconds,
            observed_fps,
            system_audio,
            microphone_audio,
        })
    }

    /// Drop all buffered material from every ring.
    pub fn clear(&self) {
        self.video.clear();
        self.system_audio.clear();
        self.microphone.clear();
    }

    /// Frames currently retained across both video tiers.
    pub fn video_frame_count(&self) -> usize {
        self.video.frame_count()
    }

    /// Seconds spanned by the retained video, if any.
    pub fn buffered_video_seconds(&self) -> f64 {
        self.video
            .ticks_span()
            .map(|(oldest, newest)| self.clock.ticks_to_seconds(newest - oldest))
            .unwrap_or(0.0)
    }
}
