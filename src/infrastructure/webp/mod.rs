// SPDX-License-Identifier: MPL-2.0
//! Decode-from-memory backend for animated WebP, using the webp-animation
//! crate (a wrapper around Google's libwebp).
//!
//! `FFmpeg` doesn't support animated WebP well, so this backend decodes the
//! whole animation up front. Animations are short, and holding every frame
//! gives true random access and exact per-frame timestamps.

use crate::application::port::{BackendKind, Capabilities, FrameSource};
use crate::config::FALLBACK_FRAME_RATE;
use crate::error::{Error, Result};
use crate::media::{resize_frame, ColourFormat, Interpolation, MediaLocator, SourceInfo, VideoFrame};
use std::sync::Arc;

pub struct WebpFrameSource {
    /// Decoded RGBA frames at original size.
    frames: Vec<Vec<u8>>,
    info: SourceInfo,
    output_size: (u32, u32),
    interpolation: Interpolation,
    next_index: usize,
}

impl WebpFrameSource {
    /// Decodes every frame of an animated WebP.
    ///
    /// Accepts in-memory bytes or a local file; URLs are left to other
    /// backends.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] if the bytes are not a WebP
    /// animation, or [`Error::Io`] if the file cannot be read.
    pub fn open(locator: &MediaLocator) -> Result<Self> {
        let bytes: Arc<[u8]> = match locator {
            MediaLocator::Memory(bytes) => Arc::clone(bytes),
            MediaLocator::Path(path) => std::fs::read(path)
                .map_err(|e| Error::Io(format!("Failed to read WebP file: {e}")))?
                .into(),
            MediaLocator::Url(_) => {
                return Err(Error::UnsupportedFormat(
                    "memory backend cannot stream URLs".to_string(),
                ))
            }
            MediaLocator::Device(_) => {
                return Err(Error::UnsupportedFormat(
                    "memory backend cannot read capture devices".to_string(),
                ))
            }
        };
        Self::from_bytes(&bytes)
    }

    // Allow similar_names: `decoder` vs `decoded` are the decoder object and
    // its output respectively.
    #[allow(clippy::similar_names)]
    #[allow(clippy::cast_precision_loss)]
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let decoder = webp_animation::Decoder::new(bytes)
            .map_err(|e| Error::UnsupportedFormat(format!("Not an animated WebP: {e:?}")))?;
        let (width, height) = decoder.dimensions();

        // timestamp(i) is when frame i ends, so frame i starts at timestamp(i - 1).
        let mut frames = Vec::new();
        let mut timestamps = Vec::new();
        let mut prev_end_ms = 0i32;
        for decoded in decoder {
            timestamps.push(f64::from(prev_end_ms) / 1000.0);
            prev_end_ms = decoded.timestamp();
            frames.push(decoded.data().to_vec());
        }

        if frames.is_empty() {
            return Err(Error::UnsupportedFormat(
                "No frames found in WebP data".to_string(),
            ));
        }

        let duration_secs = f64::from(prev_end_ms) / 1000.0;
        let frame_rate = if duration_secs > 0.0 {
            frames.len() as f64 / duration_secs
        } else {
            FALLBACK_FRAME_RATE
        };

        log::debug!(
            "memory backend decoded {} frames ({width}x{height}, {duration_secs:.2}s)",
            frames.len()
        );

        Ok(Self {
            info: SourceInfo {
                width,
                height,
                frame_rate,
                frame_count: Some(frames.len()),
                duration_secs,
                colour: ColourFormat::Rgba,
                audio: None,
                timestamps: Some(timestamps),
            },
            frames,
            output_size: (width, height),
            interpolation: Interpolation::default(),
            next_index: 0,
        })
    }
}

impl FrameSource for WebpFrameSource {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sequential_read: true,
            random_seek: true,
            frame_count_known: true,
            colour: ColourFormat::Rgba,
        }
    }

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let Some(data) = self.frames.get(self.next_index) else {
            return Ok(None);
        };
        let index = self.next_index;
        self.next_index += 1;

        let frame = VideoFrame {
            index,
            pts_secs: self
                .info
                .timestamps
                .as_ref()
                .and_then(|pts| pts.get(index).copied())
                .unwrap_or_default(),
            width: self.info.width,
            height: self.info.height,
            colour: ColourFormat::Rgba,
            data: data.clone(),
        };

        if self.output_size == (self.info.width, self.info.height) {
            Ok(Some(frame))
        } else {
            resize_frame(&frame, self.output_size, self.interpolation).map(Some)
        }
    }

    fn seek_to_frame(&mut self, index: usize, _pts_secs: f64) -> Result<()> {
        self.next_index = index.min(self.frames.len());
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.next_index = 0;
        Ok(())
    }

    fn resize(&mut self, size: Option<(u32, u32)>, interp: Interpolation) -> Result<()> {
        let size = size.unwrap_or((self.info.width, self.info.height));
        if size.0 == 0 || size.1 == 0 {
            return Err(Error::VideoStream(format!(
                "Invalid resize target {}x{}",
                size.0, size.1
            )));
        }
        self.output_size = size;
        self.interpolation = interp;
        Ok(())
    }

    fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    fn close(&mut self) {
        self.frames.clear();
        self.next_index = 0;
    }
}
