//! Synthetic capture loop: three producer threads feed the buffer for a
//! few seconds, then the trailing two seconds are extracted and the
//! encoder invocation that would finalize the clip is printed.
//!
//! Run with: `cargo run --example replay_loop`

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use replaylib::{
    AudioConfig, Clock, EncoderJob, EncoderSettings, MonotonicClock, RecorderConfig,
    SyncedAVBuffer, VideoRingConfig,
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 180;
const FPS: u32 = 30;

fn synthetic_frame(frame_number: u32) -> Vec<u8> {
    let level = (frame_number * 4 % 256) as u8;
    let mut raw = Vec::with_capacity((WIDTH * HEIGHT * 4) as usize);
    for _ in 0..WIDTH * HEIGHT {
        raw.extend_from_slice(&[level, level / 2, 255 - level, 0xFF]);
    }
    raw
}

fn main() -> replaylib::Result<()> {
    let temp = std::env::temp_dir().join("replay_loop_demo");
    std::fs::create_dir_all(&temp)?;

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let config = RecorderConfig {
        video: VideoRingConfig {
            width: WIDTH,
            height: HEIGHT,
            fps: FPS,
            ram_seconds: 2,
            total_seconds: 10,
            codec_quality: 85,
            spool_path: temp.join("spool.bin"),
        },
        audio: AudioConfig::default(),
    };
    let buffer = Arc::new(SyncedAVBuffer::new(config.clone(), Arc::clone(&clock))?);

    let video_producer = {
        let buffer = Arc::clone(&buffer);
        let clock = Arc::clone(&clock);
        thread::spawn(move || {
            for i in 0..FPS * 4 {
                buffer.add_video_frame(&synthetic_frame(i), clock.now_ticks());
                thread::sleep(Duration::from_millis(1000 / FPS as u64));
            }
        })
    };
    let audio_producer = {
        let buffer = Arc::clone(&buffer);
        let clock = Arc::clone(&clock);
        thread::spawn(move || {
            // 10ms chunks of stereo f32 silence.
            let chunk = vec![0u8; 480 * 2 * 4];
            for _ in 0..400 {
                buffer.add_system_audio(&chunk, clock.now_ticks());
                thread::sleep(Duration::from_millis(10));
            }
        })
    };

    video_producer.join().unwrap();
    audio_producer.join().unwrap();

    println!(
        "buffered: {} frames spanning {:.2}s",
        buffer.video_frame_count(),
        buffer.buffered_video_seconds()
    );

    let result = buffer.extract_last_seconds(2.0, &temp)?;
    if result.is_empty() {
        println!("nothing buffered, no clip produced");
        return Ok(());
    }
    println!(
        "clip: {} frames, {:.2}s at {:.2} fps, {} system audio chunks",
        result.frame_count,
        result.duration_seconds,
        result.observed_fps,
        result.system_audio.len()
    );

    let job = EncoderJob::prepare(
        &result,
        &config.audio,
        &temp.join("clip.mp4"),
        &EncoderSettings::default(),
    )?;
    println!("encoder invocation: ffmpeg {}", job.args().join(" "));
    job.cleanup();

    if let Some(path) = &result.video_path {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
