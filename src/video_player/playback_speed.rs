// SPDX-License-Identifier: MPL-2.0
//! Playback speed domain type.
//!
//! This module provides a type-safe wrapper for playback speed values,
//! ensuring they are always within the valid range (0.25x - 10.0x).

use crate::config::{DEFAULT_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED, MIN_PLAYBACK_SPEED};

/// Playback speed value, guaranteed to be within valid range (0.25x - 10.0x).
///
/// # Example
///
/// ```
/// use framepace::video_player::PlaybackSpeed;
///
/// let speed = PlaybackSpeed::new(2.0);
/// assert_eq!(speed.value(), 2.0);
///
/// // Values outside range are clamped
/// let too_fast = PlaybackSpeed::new(100.0);
/// assert_eq!(too_fast.value(), 10.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSpeed(f64);

impl PlaybackSpeed {
    /// Creates a new playback speed, clamping to valid range.
    ///
    /// Non-finite input yields normal speed.
    #[must_use]
    pub fn new(speed: f64) -> Self {
        if speed.is_finite() {
            Self(speed.clamp(MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED))
        } else {
            Self::default()
        }
    }

    /// Returns the speed value as f64.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Returns true at 1.0x.
    #[must_use]
    pub fn is_normal(self) -> bool {
        (self.0 - 1.0).abs() < 0.001
    }
}

impl Default for PlaybackSpeed {
    fn default() -> Self {
        Self(DEFAULT_PLAYBACK_SPEED)
    }
}
