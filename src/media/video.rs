// SPDX-License-Identifier: MPL-2.0
//! In-process FFmpeg initialization and rational helpers.

use crate::error::{Error, Result};
use std::sync::OnceLock;

/// Outcome of the one-time FFmpeg initialization.
static FFMPEG_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize FFmpeg with appropriate log level.
///
/// Safe to call multiple times; initialization happens once and its result
/// is remembered. The FFmpeg log level is set to ERROR to keep decode
/// warnings off stderr.
pub fn init_ffmpeg() -> Result<()> {
    let outcome = FFMPEG_INIT.get_or_init(|| {
        ffmpeg_next::init().map_err(|e| format!("FFmpeg initialization failed: {e}"))?;

        // SAFETY: av_log_set_level is thread-safe and only affects logging
        unsafe {
            ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_ERROR);
        }
        Ok(())
    });

    outcome.clone().map_err(|reason| Error::BackendUnavailable {
        backend: "demux",
        reason,
    })
}

/// Converts an FFmpeg rational to `f64`, returning `None` for 0/x or x/0.
#[must_use]
pub fn rational_to_f64(rational: ffmpeg_next::Rational) -> Option<f64> {
    if rational.numerator() == 0 || rational.denominator() == 0 {
        None
    } else {
        Some(f64::from(rational.numerator()) / f64::from(rational.denominator()))
    }
}
