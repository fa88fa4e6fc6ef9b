// SPDX-License-Identifier: MPL-2.0
//! Playback engine.
//!
//! [`PlaybackSession`] is the entry point. Underneath it, [`PlaybackClock`]
//! reconciles wall-clock time with the frame source and the
//! [`AudioChunkPipeline`], using a [`TimestampTable`] to map time to frames.
//! Live capture devices have no media clock and play through [`Webcam`].

pub mod audio_pipeline;
pub mod clock;
pub mod metadata;
mod playback_speed;
pub mod session;
mod state;
pub mod time_units;
pub mod timestamps;
mod volume;
pub mod webcam;

pub use audio_pipeline::{AudioChunkPipeline, ChunkPoll, PipelineSettings, PipelineStats};
pub use clock::{ClockAudio, ClockSettings, PlaybackClock};
pub use metadata::SessionMetadata;
pub use playback_speed::PlaybackSpeed;
pub use session::PlaybackSession;
pub use state::{ClockState, PlaybackState};
pub use timestamps::{TimestampIndex, TimestampProbe, TimestampTable};
pub use volume::Volume;
pub use webcam::Webcam;
