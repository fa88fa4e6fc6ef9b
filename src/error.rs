// SPDX-License-Identifier: MPL-2.0
//! Error taxonomy for the playback engine.
//!
//! Open-time failures abort session construction. Steady-state worker
//! failures are contained by the component that hit them and degrade
//! playback (no audio, frozen frame) instead of surfacing here, except for
//! video decode failures, which are fatal to the session.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Io(String),
    Config(String),

    /// No backend could open the media. Fatal at open.
    UnsupportedFormat(String),

    /// A backend's external dependency is missing. Triggers fallback.
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// Every backend in the preference list was unavailable.
    NoBackendAvailable,

    /// The backend cannot seek; the caller must read sequentially.
    SeekUnsupported,

    /// An audio extraction worker failed. Recovered by disabling audio.
    AudioStream(String),

    /// Video decode failure. Fatal to the session.
    VideoStream(String),

    /// Audio output or capture device failure. Fatal to audio only when
    /// raised by the output device.
    Device(String),

    /// Reverse playback would need more memory than the configured ceiling.
    ReverseMemoryExceeded { required_bytes: u64, limit_bytes: u64 },

    /// The session has been closed.
    Closed,
}

impl Error {
    /// Returns true if the backend chain should move on to the next backend.
    #[must_use]
    pub fn is_backend_fallback(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable { .. } | Error::UnsupportedFormat(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O Error: {e}"),
            Error::Config(e) => write!(f, "Config Error: {e}"),
            Error::UnsupportedFormat(e) => write!(f, "Unsupported format: {e}"),
            Error::BackendUnavailable { backend, reason } => {
                write!(f, "Backend '{backend}' unavailable: {reason}")
            }
            Error::NoBackendAvailable => write!(f, "No frame source backend available"),
            Error::SeekUnsupported => write!(f, "Seeking is not supported by this backend"),
            Error::AudioStream(e) => write!(f, "Audio stream error: {e}"),
            Error::VideoStream(e) => write!(f, "Video stream error: {e}"),
            Error::Device(e) => write!(f, "Device error: {e}"),
            Error::ReverseMemoryExceeded {
                required_bytes,
                limit_bytes,
            } => write!(
                f,
                "Reverse playback needs {required_bytes} bytes, limit is {limit_bytes} bytes"
            ),
            Error::Closed => write!(f, "Session is closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
