// SPDX-License-Identifier: MPL-2.0
//! `framepace` turns a video container (file, in-memory bytes or resolved
//! stream URL) into decoded video frames and audio chunks delivered on demand
//! to a caller-driven render loop.
//!
//! - [`application::port`]: the traits at the seams (frame sources, chunk
//!   extractors, sinks, stream resolvers)
//! - [`infrastructure`]: FFmpeg, libwebp and cpal adapters
//! - [`video_player`]: the playback clock, audio pipeline and session facade
//! - `testing` (behind the `testing` feature): in-memory collaborators for
//!   driving a session without FFmpeg or an audio device

#![doc(html_root_url = "https://docs.rs/framepace/0.1.0")]

pub mod application;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod media;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod video_player;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};
pub use media::{CaptureDevice, ColourFormat, Interpolation, MediaLocator, VideoFrame};
pub use video_player::{PlaybackSession, SessionMetadata, Webcam};
