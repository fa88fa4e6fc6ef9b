// SPDX-License-Identifier: MPL-2.0
//! Decoded video frames and in-process resampling.

use crate::error::{Error, Result};
use image_rs::imageops::FilterType;
use image_rs::{ImageBuffer, Rgb, Rgba};
use serde::{Deserialize, Serialize};

/// Pixel layout of a decoded frame.
///
/// This is a fixed property of the backend that produced the frame and is
/// never silently normalized; renderers must consult it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColourFormat {
    Rgb,
    Bgr,
    Rgba,
}

impl ColourFormat {
    /// Bytes per pixel.
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba => 4,
        }
    }

    /// Name of the matching ffmpeg raw pixel format.
    #[must_use]
    pub fn ffmpeg_pix_fmt(self) -> &'static str {
        match self {
            Self::Rgb => "rgb24",
            Self::Bgr => "bgr24",
            Self::Rgba => "rgba",
        }
    }
}

/// Resampling filter used when frames are resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    #[default]
    Linear,
    Cubic,
    Area,
    Lanczos,
}

impl Interpolation {
    /// Filter used by the in-process resampler.
    #[must_use]
    pub fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Linear | Self::Area => FilterType::Triangle,
            Self::Cubic => FilterType::CatmullRom,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }

    /// Flag name for ffmpeg's `scale` filter.
    #[must_use]
    pub fn ffmpeg_flag(self) -> &'static str {
        match self {
            Self::Nearest => "neighbor",
            Self::Linear => "bilinear",
            Self::Cubic => "bicubic",
            Self::Area => "area",
            Self::Lanczos => "lanczos",
        }
    }
}

/// A decoded image buffer plus its position in the stream.
///
/// Once returned by a backend the frame is owned by the caller; no backend
/// keeps a reference to its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Index of this frame in presentation order.
    pub index: usize,
    /// Presentation timestamp in seconds.
    pub pts_secs: f64,
    pub width: u32,
    pub height: u32,
    pub colour: ColourFormat,
    /// Tightly packed pixel rows (`width * height * channels` bytes).
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Returns the total size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Expected buffer size for the given geometry.
    #[must_use]
    pub fn expected_len(width: u32, height: u32, colour: ColourFormat) -> usize {
        width as usize * height as usize * colour.channels()
    }
}

/// Resamples a frame in-process, preserving its colour format and index.
///
/// The resampler is channel-order agnostic, so BGR frames go through the
/// same three-channel path as RGB.
pub fn resize_frame(
    frame: &VideoFrame,
    size: (u32, u32),
    interp: Interpolation,
) -> Result<VideoFrame> {
    let (width, height) = size;
    if width == 0 || height == 0 {
        return Err(Error::VideoStream(format!(
            "Invalid resize target {width}x{height}"
        )));
    }
    if (frame.width, frame.height) == size {
        return Ok(frame.clone());
    }

    let filter = interp.filter_type();
    let data = match frame.colour {
        ColourFormat::Rgb | ColourFormat::Bgr => {
            let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
                ImageBuffer::from_raw(frame.width, frame.height, frame.data.clone())
                    .ok_or_else(|| malformed(frame))?;
            image_rs::imageops::resize(&buffer, width, height, filter).into_raw()
        }
        ColourFormat::Rgba => {
            let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
                ImageBuffer::from_raw(frame.width, frame.height, frame.data.clone())
                    .ok_or_else(|| malformed(frame))?;
            image_rs::imageops::resize(&buffer, width, height, filter).into_raw()
        }
    };

    Ok(VideoFrame {
        index: frame.index,
        pts_secs: frame.pts_secs,
        width,
        height,
        colour: frame.colour,
        data,
    })
}

fn malformed(frame: &VideoFrame) -> Error {
    Error::VideoStream(format!(
        "Frame {} has {} bytes, expected {} for {}x{}",
        frame.index,
        frame.data.len(),
        VideoFrame::expected_len(frame.width, frame.height, frame.colour),
        frame.width,
        frame.height
    ))
}
