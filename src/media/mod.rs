// SPDX-License-Identifier: MPL-2.0
//! Media identification and plain data exchanged with collaborators.
//!
//! Everything in this module is backend-agnostic: locators name the media,
//! [`SourceInfo`] describes what an opened backend found, and [`frame`]
//! holds the decoded buffers handed to renderers.

pub mod frame;
pub mod video;

pub use frame::{resize_frame, ColourFormat, Interpolation, VideoFrame};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifies the media a session plays. Immutable once constructed.
#[derive(Clone, PartialEq, Eq)]
pub enum MediaLocator {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// An in-memory container byte stream.
    Memory(Arc<[u8]>),
    /// A direct media URL, typically produced by a stream resolver.
    Url(String),
    /// A live capture device such as a webcam.
    Device(CaptureDevice),
}

impl MediaLocator {
    pub fn path<P: AsRef<Path>>(path: P) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    pub fn memory(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Memory(bytes.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    pub fn device(device: CaptureDevice) -> Self {
        Self::Device(device)
    }

    /// Input argument for an external ffmpeg/ffprobe process.
    ///
    /// In-memory media is fed through stdin, so it maps to `pipe:0`.
    #[must_use]
    pub fn ffmpeg_input(&self) -> String {
        match self {
            Self::Path(path) => path.to_string_lossy().into_owned(),
            Self::Memory(_) => "pipe:0".to_string(),
            Self::Url(url) => url.clone(),
            Self::Device(device) => device.device.clone(),
        }
    }

    /// Input options plus `-i <input>` for an external ffmpeg/ffprobe process.
    #[must_use]
    pub fn ffmpeg_input_args(&self) -> Vec<String> {
        match self {
            Self::Device(device) => device.input_args(),
            _ => vec!["-i".to_string(), self.ffmpeg_input()],
        }
    }

    /// Bytes to write to the external process' stdin, if any.
    #[must_use]
    pub fn stdin_bytes(&self) -> Option<Arc<[u8]>> {
        match self {
            Self::Memory(bytes) => Some(Arc::clone(bytes)),
            _ => None,
        }
    }

    /// Whether an external process can seek its input before decoding.
    ///
    /// Stdin is not seekable, so in-memory media only supports decode and
    /// discard. Live devices cannot seek at all.
    #[must_use]
    pub fn supports_input_seek(&self) -> bool {
        !matches!(self, Self::Memory(_) | Self::Device(_))
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

/// A capture device read through one of ffmpeg's device input formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    /// `v4l2`, `avfoundation`, `dshow`, ...
    pub input_format: String,
    /// Device name in the form the input format expects.
    pub device: String,
    /// Requested capture size. Devices fall back to the closest mode they have.
    pub capture_size: Option<(u32, u32)>,
    pub framerate: Option<u32>,
}

impl CaptureDevice {
    pub fn new(input_format: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            input_format: input_format.into(),
            device: device.into(),
            capture_size: None,
            framerate: None,
        }
    }

    /// Camera number `id` through the platform's native capture input.
    ///
    /// `dshow` addresses devices by name; use [`CaptureDevice::new`] when
    /// the numeric form is not accepted.
    #[must_use]
    pub fn camera(id: u32) -> Self {
        if cfg!(target_os = "macos") {
            Self::new("avfoundation", format!("{id}:none"))
        } else if cfg!(target_os = "windows") {
            Self::new("dshow", format!("video={id}"))
        } else {
            Self::new("v4l2", format!("/dev/video{id}"))
        }
    }

    #[must_use]
    pub fn with_capture_size(mut self, size: (u32, u32)) -> Self {
        self.capture_size = Some(size);
        self
    }

    #[must_use]
    pub fn with_framerate(mut self, fps: u32) -> Self {
        self.framerate = Some(fps);
        self
    }

    fn input_args(&self) -> Vec<String> {
        let mut args = vec!["-f".to_string(), self.input_format.clone()];
        if let Some((width, height)) = self.capture_size {
            args.extend(["-video_size".to_string(), format!("{width}x{height}")]);
        }
        if let Some(fps) = self.framerate {
            args.extend(["-framerate".to_string(), fps.to_string()]);
        }
        args.extend(["-i".to_string(), self.device.clone()]);
        args
    }
}

impl fmt::Debug for MediaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Device(device) => f.debug_tuple("Device").field(device).finish(),
        }
    }
}

impl fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Memory(bytes) => write!(f, "<memory: {} bytes>", bytes.len()),
            Self::Url(url) => write!(f, "{url}"),
            Self::Device(device) => write!(f, "{}:{}", device.input_format, device.device),
        }
    }
}

/// Audio stream properties discovered at open time.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamInfo {
    /// Number of channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Codec name (e.g., "aac", "opus").
    pub codec_name: String,
    /// Number of audio streams in the container.
    pub track_count: usize,
}

/// What a backend learned about the media when it opened it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Average frame rate in frames per second.
    pub frame_rate: f64,
    /// Total frame count, when the container reports or implies one.
    pub frame_count: Option<usize>,
    pub duration_secs: f64,
    pub colour: ColourFormat,
    pub audio: Option<AudioStreamInfo>,
    /// Per-frame presentation timestamps, for backends that know them
    /// without probing.
    pub timestamps: Option<Vec<f64>>,
}

impl SourceInfo {
    /// Frame count, falling back to `duration * frame_rate`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn effective_frame_count(&self) -> usize {
        self.frame_count
            .unwrap_or_else(|| (self.duration_secs * self.frame_rate).round().max(0.0) as usize)
            .max(1)
    }
}
