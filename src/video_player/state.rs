// SPDX-License-Identifier: MPL-2.0
//! Playback state machine.
//!
//! Manages the lifecycle of playback with clear state transitions:
//! - Stopped: initial and terminal state (explicit stop or end of stream)
//! - Playing: the clock advances on every poll
//! - Paused: position frozen, resumable
//!
//! `muted`, `buffering` and `reverse` are orthogonal flags valid in any
//! non-stopped state.

use super::{PlaybackSpeed, Volume};

/// Playback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    /// Returns true if the clock is advancing.
    #[must_use]
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }

    #[must_use]
    pub fn is_paused(self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Returns true in any state other than `Stopped`.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// The single source of truth for where playback is.
///
/// Only the playback clock writes this.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockState {
    /// Media time in seconds, always within `[0, duration]`.
    pub position_secs: f64,
    /// Frame index that corresponds to `position_secs`.
    pub frame_index: usize,
    pub speed: PlaybackSpeed,
    pub playback: PlaybackState,
    pub muted: bool,
    pub volume: Volume,
    pub reverse: bool,
    /// Audio for the current position is late and the clock is holding.
    pub buffering: bool,
    pub looping: bool,
    /// Set when playback stopped by reaching the end of the media.
    pub ended: bool,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            position_secs: 0.0,
            frame_index: 0,
            speed: PlaybackSpeed::default(),
            playback: PlaybackState::Stopped,
            muted: false,
            volume: Volume::default(),
            reverse: false,
            buffering: false,
            looping: false,
            ended: false,
        }
    }
}

impl ClockState {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.playback.is_active()
    }
}
