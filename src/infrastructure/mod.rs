// SPDX-License-Identifier: MPL-2.0
//! Infrastructure layer adapters.
//!
//! This module contains concrete implementations of the port traits defined in
//! `application::port`. These adapters wrap external dependencies like `FFmpeg`,
//! libwebp and the system audio device.
//!
//! # Available Adapters
//!
//! - [`ffmpeg`]: Demux and pipe frame sources, audio chunk extraction
//! - [`webp`]: Animated WebP decoded from memory
//! - [`audio_output`]: Audio sink on the default cpal device
//! - [`backends`]: Preference-ordered backend selection

pub mod audio_output;
pub mod backends;
pub mod ffmpeg;
pub mod webp;

pub use audio_output::CpalAudioSink;
pub use backends::{open_chunk_extractor, open_frame_source};
pub use ffmpeg::{DemuxFrameSource, FfmpegChunkExtractor, PipeFrameSource};
pub use webp::WebpFrameSource;
