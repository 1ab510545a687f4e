//! Frame bookkeeping for baked animation.
//!
//! Baked animations store one sample per frame and every animation length is
//! quantized up to a multiple of [`FRAME_QUANTUM`].

/// Baked animation lengths are multiples of this many frames.
pub const FRAME_QUANTUM: usize = 10;

/// Round a raw sample count up to the next multiple of [`FRAME_QUANTUM`].
///
/// Counts that are already a multiple are kept; zero stays zero.
pub fn quantize_length(count: usize) -> usize {
    count.div_ceil(FRAME_QUANTUM) * FRAME_QUANTUM
}

/// Frame/time pairs for the inclusive frame range `[begin, end]`.
///
/// The range spans `duration` seconds, so `fps = (end - begin) / duration`
/// and frame `i` lands at `(i - begin) / fps`. A single-frame range or a
/// non-positive duration puts every frame at time zero.
pub fn frame_times(begin: i32, end: i32, duration: f32) -> Vec<(i32, f32)> {
    if end < begin {
        return Vec::new();
    }

    let span = (end - begin) as f32;
    let fps = if duration > 0.0 { span / duration } else { 0.0 };

    (begin..=end)
        .map(|frame| {
            let time = if fps > 0.0 {
                (frame - begin) as f32 / fps
            } else {
                0.0
            };
            (frame, time)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_length() {
        assert_eq!(quantize_length(0), 0);
        assert_eq!(quantize_length(1), 10);
        assert_eq!(quantize_length(10), 10);
        assert_eq!(quantize_length(11), 20);
        assert_eq!(quantize_length(29), 30);
    }

    #[test]
    fn test_frame_times_thirty_frames_over_one_second() {
        let times = frame_times(0, 29, 1.0);
        assert_eq!(times.len(), 30);
        assert_eq!(times[0], (0, 0.0));
        // fps = 29, so the last frame lands exactly on the duration
        assert!((times[29].1 - 1.0).abs() < 1e-5);
        assert!((times[1].1 - 1.0 / 29.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_times_offset_range() {
        let times = frame_times(30, 39, 0.5);
        assert_eq!(times.len(), 10);
        assert_eq!(times[0], (30, 0.0));
        assert!((times[9].1 - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_frame_times_degenerate() {
        assert!(frame_times(5, 4, 1.0).is_empty());
        let single = frame_times(3, 3, 0.0);
        assert_eq!(single, vec![(3, 0.0)]);
    }
}
