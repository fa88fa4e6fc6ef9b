// SPDX-License-Identifier: MPL-2.0
//! Audio port definitions.
//!
//! - [`ChunkExtractor`]: decodes one fixed-duration slice of source audio,
//!   typically by running an external decoder process
//! - [`AudioSink`]: the output device collaborator that plays decoded PCM

use crate::error::Result;

/// A unit of extraction work: audio for `[start_secs, start_secs + duration_secs)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRequest {
    /// Sequence number within the current epoch.
    pub index: usize,
    /// Seek generation the request was issued under.
    pub epoch: u64,
    /// Source-time offset of the chunk, in seconds.
    pub start_secs: f64,
    /// Source-time duration of the chunk, in seconds.
    pub duration_secs: f64,
    /// Playback speed baked into the decoded samples.
    pub speed: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Index among the media's audio streams.
    pub audio_track: usize,
    /// 0 for the first attempt, 1 for the aligned retry.
    pub attempt: u8,
}

impl ChunkRequest {
    /// Retry variant: start snapped down to a millisecond and duration
    /// clamped to what remains of the media.
    #[must_use]
    pub fn aligned(&self, media_duration_secs: f64) -> Self {
        let start_secs = (self.start_secs * 1000.0).floor() / 1000.0;
        let remaining = (media_duration_secs - start_secs).max(0.0);
        let duration_secs = (self.duration_secs.min(remaining) * 1000.0).round() / 1000.0;
        Self {
            start_secs,
            duration_secs,
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// Cooperative cancellation probe handed to extractors.
pub trait Cancellation {
    /// True once the request's epoch is stale or the pipeline is closing.
    fn is_cancelled(&self) -> bool;
}

/// Decodes chunks of source audio to interleaved `f32` PCM.
pub trait ChunkExtractor: Send + Sync {
    /// Extracts the samples for `request`.
    ///
    /// Implementations should poll `cancel` while they work and stop early
    /// when it fires; the result of a cancelled extraction is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::AudioStream`] when decoding fails or the
    /// external process exits abnormally.
    fn extract(&self, request: &ChunkRequest, cancel: &dyn Cancellation) -> Result<Vec<f32>>;
}

/// Decoded PCM covering one chunk of source audio.
///
/// Ownership moves from the worker to the consumer queue on completion; the
/// chunk is consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub index: usize,
    pub epoch: u64,
    pub start_secs: f64,
    /// Source-time duration covered.
    pub duration_secs: f64,
    /// Interleaved samples normalized to [-1.0, 1.0].
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Returns the number of frames (samples per channel).
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    /// Wall-clock time this chunk takes to play.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn playback_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }
}

/// Audio output collaborator.
///
/// The engine pushes decoded chunks and never touches the device itself.
pub trait AudioSink {
    /// Queues a chunk for playback.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Device`] if the output device failed.
    fn push(&mut self, chunk: AudioChunk) -> Result<()>;

    /// Seconds of audio queued and not yet played.
    fn queued_secs(&self) -> f64;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Drops queued audio without changing the pause state.
    fn clear(&mut self);

    fn set_volume(&mut self, volume: f32);

    fn set_muted(&mut self, muted: bool);

    /// Sample rate and channel count the sink expects.
    fn output_format(&self) -> (u32, u16);
}
