//! External-encoder handoff
//!
//! The core never muxes or encodes; it hands the extracted window to an
//! external `ffmpeg` process. This module turns an [`ExtractResult`] into
//! that invocation: the raw BGRA file becomes a `rawvideo` input at the
//! observed frame rate, each non-empty audio list is written out as an
//! `f32le` PCM file and mapped as its own track, and `-shortest` trims
//! audio to the video.
//!
//! [`ExtractResult`]: crate::buffer::ExtractResult

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::audio::AudioChunk;
use crate::buffer::ExtractResult;
use crate::config::AudioConfig;
use crate::error::{ReplayError, Result};

/// Knobs for the external encoder invocation.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub ffmpeg_path: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Appended just before the output path.
    pub extra_output_args: Vec<String>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            video_codec: "libx264".into(),
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
            extra_output_args: vec!["-movflags".into(), "+faststart".into()],
        }
    }
}

/// A fully prepared encoder invocation plus the temp PCM files backing it.
#[derive(Debug)]
pub struct EncoderJob {
    program: PathBuf,
    args: Vec<String>,
    pcm_paths: Vec<PathBuf>,
}

impl EncoderJob {
    /// Build the invocation for one extracted clip.
    ///
    /// Fails when the result is empty. PCM temp files are written next to
    /// the raw video file and removed by [`cleanup`].
    ///
    /// [`cleanup`]: EncoderJob::cleanup
    pub fn prepare(
        result: &ExtractResult,
        audio: &AudioConfig,
        output: &Path,
        settings: &EncoderSettings,
    ) -> Result<Self> {
        let video_path = result
            .video_path
            .as_deref()
            .ok_or_else(|| ReplayError::Config("extract result holds no clip".into()))?;

        let mut args: Vec<String> = vec!["-y".into()];
        let mut pcm_paths = Vec::new();

        args.extend([
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "bgra".into(),
            "-video_size".into(),
            format!("{}x{}", result.width, result.height),
            "-framerate".into(),
            format!("{:.3}", result.observed_fps),
            "-i".into(),
            video_path.display().to_string(),
        ]);

        for (name, chunks) in [
            ("system", &result.system_audio),
            ("microphone", &result.microphone_audio),
        ] {
            if chunks.is_empty() {
                continue;
            }
            let pcm_path = video_path.with_extension(format!("{name}.f32le"));
            write_pcm(chunks, &pcm_path)?;
            args.extend([
                "-f".into(),
                "f32le".into(),
                "-ar".into(),
                audio.sample_rate.to_string(),
                "-ac".into(),
                audio.channels.to_string(),
                "-i".into(),
                pcm_path.display().to_string(),
            ]);
            pcm_paths.push(pcm_path);
        }

        args.extend(["-map".into(), "0:v".into()]);
        for i in 0..pcm_paths.len() {
            args.extend(["-map".into(), format!("{}:a", i + 1)]);
        }

        args.extend(["-c:v".into(), settings.video_codec.clone()]);
        if !pcm_paths.is_empty() {
            args.extend([
                "-c:a".into(),
                settings.audio_codec.clone(),
                "-b:a".into(),
                settings.audio_bitrate.clone(),
            ]);
        }
        // Video is the shortest stream; audio is trimmed to match.
        args.push("-shortest".into());
        args.extend(settings.extra_output_args.iter().cloned());
        args.push(output.display().to_string());

        Ok(Self {
            program: settings.ffmpeg_path.clone(),
            args,
            pcm_paths,
        })
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run the encoder to completion, then remove the temp PCM files.
    pub fn run(self) -> Result<()> {
        tracing::info!(
            program = %self.program.display(),
            args = ?self.args,
            "invoking external encoder"
        );
        let status = Command::new(&self.program).args(&self.args).status();
        self.cleanup();

        let status = status?;
        if status.success() {
            Ok(())
        } else {
            Err(ReplayError::Other(anyhow::anyhow!(
                "encoder exited with {status}"
            )))
        }
    }

    /// Remove the temp PCM files. The raw video file stays with its owner.
    pub fn cleanup(&self) {
        for path in &self.pcm_paths {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::debug!(path = %path.display(), error = %e, "pcm temp not removed");
            }
        }
    }
}

/// Concatenate chunk payloads into one PCM file in chronological order.
fn write_pcm(chunks: &[AudioChunk], path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut sink = BufWriter::new(file);
    for chunk in chunks {
        sink.write_all(&chunk.data)?;
    }
    sink.flush()?;
    Ok(())
}
