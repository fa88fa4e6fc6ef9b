// SPDX-License-Identifier: MPL-2.0
//! Backend selection.
//!
//! Backends are tried in the configured preference order. A backend that is
//! unavailable or cannot read the media hands over to the next one; any
//! other error aborts the open.

use super::ffmpeg::{DemuxFrameSource, FfmpegChunkExtractor, PipeFrameSource};
use super::webp::WebpFrameSource;
use crate::application::port::{BackendKind, ChunkExtractor, FrameSource};
use crate::config::PlaybackConfig;
use crate::error::{Error, Result};
use crate::media::MediaLocator;

fn open_backend(
    kind: BackendKind,
    locator: &MediaLocator,
    config: &PlaybackConfig,
) -> Result<Box<dyn FrameSource>> {
    match kind {
        BackendKind::Demux => Ok(Box::new(DemuxFrameSource::open(locator)?)),
        BackendKind::Memory => Ok(Box::new(WebpFrameSource::open(locator)?)),
        BackendKind::Pipe => Ok(Box::new(PipeFrameSource::open(locator, config)?)),
        BackendKind::Custom => Err(Error::BackendUnavailable {
            backend: kind.name(),
            reason: "custom sources are supplied by the caller".to_string(),
        }),
    }
}

/// Opens the first backend in `config.backends` that accepts `locator`.
///
/// # Errors
///
/// - [`Error::NoBackendAvailable`] if every backend was unavailable
/// - [`Error::UnsupportedFormat`] if backends ran but none could read the media
/// - any non-fallback error raised by a backend
pub fn open_frame_source(
    locator: &MediaLocator,
    config: &PlaybackConfig,
) -> Result<Box<dyn FrameSource>> {
    let mut last_unsupported: Option<String> = None;

    for &kind in &config.backends {
        match open_backend(kind, locator, config) {
            Ok(source) => {
                log::debug!("opened {locator} with the {} backend", kind.name());
                return Ok(source);
            }
            Err(Error::UnsupportedFormat(reason)) => {
                log::debug!("{} backend cannot read {locator}: {reason}", kind.name());
                last_unsupported = Some(reason);
            }
            Err(Error::BackendUnavailable { backend, reason }) => {
                log::debug!("{backend} backend unavailable: {reason}");
            }
            Err(e) => return Err(e),
        }
    }

    Err(match last_unsupported {
        Some(reason) => Error::UnsupportedFormat(reason),
        None => Error::NoBackendAvailable,
    })
}

/// Creates the audio chunk extractor for `locator`.
///
/// # Errors
///
/// Returns [`Error::BackendUnavailable`] if `ffmpeg` cannot run.
pub fn open_chunk_extractor(
    locator: &MediaLocator,
    config: &PlaybackConfig,
) -> Result<Box<dyn ChunkExtractor>> {
    Ok(Box::new(FfmpegChunkExtractor::new(
        &config.ffmpeg_path,
        locator.clone(),
    )?))
}
