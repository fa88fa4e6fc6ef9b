// SPDX-License-Identifier: MPL-2.0
//! `FFmpeg` adapters.
//!
//! - [`demux`]: in-process decode through the `FFmpeg` libraries
//! - [`pipe`]: raw frames from an external `ffmpeg` process
//! - [`extractor`]: audio chunk extraction via an external `ffmpeg` process
//! - [`probe`]: stream metadata and per-frame timestamps via `ffprobe`
//! - [`process`]: child process management shared by the above

pub mod demux;
pub mod extractor;
pub mod pipe;
pub mod probe;
pub mod process;

pub use demux::DemuxFrameSource;
pub use extractor::FfmpegChunkExtractor;
pub use pipe::PipeFrameSource;
