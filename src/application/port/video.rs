// SPDX-License-Identifier: MPL-2.0
//! Frame source port definition.
//!
//! [`FrameSource`] is the uniform contract over decode backends. A backend is
//! opened once per session by its own constructor and stays fixed for the
//! session's lifetime; switching backend means reopening.
//!
//! # Thread Safety
//!
//! Implementations must be `Send` so a session can move between threads, but
//! they are driven by exactly one control thread. Container demuxers and pipe
//! readers are not safe for concurrent positional reads.
//!
//! # Example
//!
//! ```ignore
//! use framepace::application::port::FrameSource;
//!
//! fn first_second(source: &mut dyn FrameSource) -> framepace::error::Result<usize> {
//!     let wanted = source.frame_rate().ceil() as usize;
//!     let mut decoded = 0;
//!     while decoded < wanted {
//!         match source.next_frame()? {
//!             Some(_frame) => decoded += 1,
//!             None => break,
//!         }
//!     }
//!     Ok(decoded)
//! }
//! ```

use crate::error::Result;
use crate::media::{ColourFormat, Interpolation, SourceInfo, VideoFrame};
use serde::{Deserialize, Serialize};

/// Concrete decode backends, in the order they are tried by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process container demux and decode (FFmpeg libraries).
    Demux,
    /// Decode-from-memory of animated images (libwebp).
    Memory,
    /// Raw frames read from an external decoder process.
    Pipe,
    /// Supplied by the embedding application.
    Custom,
}

impl BackendKind {
    /// Default preference order for opening media.
    #[must_use]
    pub fn preference_order() -> &'static [BackendKind] {
        &[BackendKind::Demux, BackendKind::Memory, BackendKind::Pipe]
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Demux => "demux",
            Self::Memory => "memory",
            Self::Pipe => "pipe",
            Self::Custom => "custom",
        }
    }
}

/// What a backend can do. The engine dispatches on these flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub sequential_read: bool,
    pub random_seek: bool,
    pub frame_count_known: bool,
    pub colour: ColourFormat,
}

/// Uniform interface over backend-specific decoders.
pub trait FrameSource: Send {
    /// Which backend this is.
    fn backend(&self) -> BackendKind;

    fn capabilities(&self) -> Capabilities;

    /// Properties discovered when the backend opened the media.
    fn info(&self) -> &SourceInfo;

    /// Decodes the next frame in presentation order.
    ///
    /// Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::VideoStream`] if decoding fails.
    fn next_frame(&mut self) -> Result<Option<VideoFrame>>;

    /// Positions the decoder so the next `next_frame()` yields `index`.
    ///
    /// `pts_secs` is that frame's presentation time, measured from the start
    /// of the stream. Backends that seek by time must use it rather than
    /// deriving a time from the average frame rate, which is wrong for
    /// variable-rate media.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::SeekUnsupported`] if the backend lacks
    /// the random-seek capability.
    fn seek_to_frame(&mut self, index: usize, pts_secs: f64) -> Result<()>;

    /// Restarts decoding from frame 0. Every backend supports this, even
    /// those that cannot seek.
    fn rewind(&mut self) -> Result<()>;

    /// Changes the output size of subsequently decoded frames.
    ///
    /// `None` restores the original size.
    fn resize(&mut self, size: Option<(u32, u32)>, interp: Interpolation) -> Result<()>;

    /// Size of frames currently produced.
    fn output_size(&self) -> (u32, u32);

    /// Releases the decoder handle. Further calls may fail.
    fn close(&mut self);

    fn frame_count(&self) -> usize {
        self.info().effective_frame_count()
    }

    fn frame_rate(&self) -> f64 {
        self.info().frame_rate
    }

    fn original_size(&self) -> (u32, u32) {
        (self.info().width, self.info().height)
    }

    fn colour_format(&self) -> ColourFormat {
        self.capabilities().colour
    }
}

/// Rendering collaborator that receives frames on demand.
pub trait FrameSink {
    fn present(&mut self, frame: &VideoFrame);
}

impl<F: FnMut(&VideoFrame)> FrameSink for F {
    fn present(&mut self, frame: &VideoFrame) {
        self(frame);
    }
}
