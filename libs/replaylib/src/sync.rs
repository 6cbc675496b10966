//! Timestamp utilities for cross-stream alignment
//!
//! Video and audio only relate through the shared tick domain, so the
//! window selection and drift checks all reduce to timestamp comparison.
//! This module holds those comparisons: window inclusion for extraction,
//! and the delta/tolerance helpers a supervising service can use to watch
//! producer drift.

/// Default tolerance for considering two streams aligned, in milliseconds.
///
/// 16.6ms is one frame at 60 FPS.
pub const DEFAULT_SYNC_TOLERANCE_MS: f64 = 16.6;

/// Absolute timestamp difference in milliseconds.
#[inline]
pub fn timestamp_delta_ms(a_ticks: i64, b_ticks: i64, ticks_per_second: i64) -> f64 {
    let delta = (a_ticks - b_ticks).abs();
    delta as f64 * 1_000.0 / ticks_per_second as f64
}

/// Whether two timestamps fall within `tolerance_ms` of each other.
#[inline]
pub fn are_synchronized(
    a_ticks: i64,
    b_ticks: i64,
    ticks_per_second: i64,
    tolerance_ms: f64,
) -> bool {
    timestamp_delta_ms(a_ticks, b_ticks, ticks_per_second) <= tolerance_ms
}

/// Window-inclusion predicate for audio chunks: inside the closed video
/// window, with `end_margin_ticks` of grace past the last frame so the
/// chunk spanning the boundary survives. Chunks before the first frame are
/// never included.
#[inline]
pub fn chunk_in_window(
    chunk_ticks: i64,
    start_ticks: i64,
    end_ticks: i64,
    end_margin_ticks: i64,
) -> bool {
    chunk_ticks >= start_ticks && chunk_ticks <= end_ticks + end_margin_ticks
}

/// Average frame rate observed over an emitted window.
///
/// Falls back to `nominal_fps` when the window is too short to measure
/// (fewer than two frames, or zero span).
#[inline]
pub fn observed_rate(
    frame_count: usize,
    start_ticks: i64,
    end_ticks: i64,
    ticks_per_second: i64,
    nominal_fps: f64,
) -> f64 {
    let span = end_ticks - start_ticks;
    if frame_count > 1 && span > 0 {
        (frame_count - 1) as f64 * ticks_per_second as f64 / span as f64
    } else {
        nominal_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::NANOS_PER_SECOND;

    #[test]
    fn test_timestamp_delta() {
        assert_eq!(
            timestamp_delta_ms(1_000_000_000, 1_000_000_000, NANOS_PER_SECOND),
            0.0
        );
        assert_eq!(
            timestamp_delta_ms(1_000_000_000, 1_001_000_000, NANOS_PER_SECOND),
            1.0
        );
        // Order does not matter.
        assert_eq!(
            timestamp_delta_ms(1_001_000_000, 1_000_000_000, NANOS_PER_SECOND),
            1.0
        );
    }

    #[test]
    fn test_are_synchronized() {
        assert!(are_synchronized(
            1_000_000_000,
            1_000_005_000,
            NANOS_PER_SECOND,
            10.0
        ));
        assert!(!are_synchronized(
            1_000_000_000,
            1_050_000_000,
            NANOS_PER_SECOND,
            10.0
        ));
    }

    #[test]
    fn test_chunk_in_window_bounds() {
        let margin = NANOS_PER_SECOND / 10;
        let (start, end) = (10 * NANOS_PER_SECOND, 11 * NANOS_PER_SECOND);

        // Exactly at the start is included, before it is not.
        assert!(chunk_in_window(start, start, end, margin));
        assert!(!chunk_in_window(start - 1, start, end, margin));
        // Within the margin past the end is included, beyond it is not.
        assert!(chunk_in_window(end + margin, start, end, margin));
        assert!(!chunk_in_window(end + margin + 1, start, end, margin));
    }

    #[test]
    fn test_observed_rate() {
        // 10 frames spanning 0.9 seconds: 10 fps cadence.
        let rate = observed_rate(10, 0, 900_000_000, NANOS_PER_SECOND, 60.0);
        assert!((rate - 10.0).abs() < 1e-9);

        // Degenerate windows fall back to nominal.
        assert_eq!(observed_rate(1, 0, 0, NANOS_PER_SECOND, 60.0), 60.0);
        assert_eq!(observed_rate(0, 0, 0, NANOS_PER_SECOND, 60.0), 60.0);
    }
}
