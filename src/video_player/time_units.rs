// SPDX-License-Identifier: MPL-2.0
//! Time unit conversion utilities for video playback.
//!
//! Provides conversions between seconds, microseconds and constant-rate frame
//! indices.

/// Microseconds per second as f64 for calculations.
pub const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Converts seconds to whole microseconds (truncating).
///
/// # Examples
///
/// ```
/// use framepace::video_player::time_units::secs_to_micros;
///
/// assert_eq!(secs_to_micros(1.0), 1_000_000);
/// assert_eq!(secs_to_micros(0.5), 500_000);
/// ```
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub fn secs_to_micros(secs: f64) -> i64 {
    (secs * MICROS_PER_SECOND) as i64
}

/// Index of the frame shown at `secs` for a constant frame rate:
/// `floor(secs * fps)`, never negative.
///
/// # Examples
///
/// ```
/// use framepace::video_player::time_units::frame_at;
///
/// assert_eq!(frame_at(1.0, 24.0), 24);
/// assert_eq!(frame_at(0.99, 24.0), 23);
/// assert_eq!(frame_at(-3.0, 24.0), 0);
/// ```
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn frame_at(secs: f64, fps: f64) -> usize {
    let index = (secs * fps).floor();
    if index.is_finite() && index > 0.0 {
        index as usize
    } else {
        0
    }
}

/// Start time of frame `index` for a constant frame rate.
#[inline]
#[allow(clippy::cast_precision_loss)]
pub fn frame_start_secs(index: usize, fps: f64) -> f64 {
    if fps > 0.0 {
        index as f64 / fps
    } else {
        0.0
    }
}
