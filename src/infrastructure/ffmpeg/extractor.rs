// SPDX-License-Identifier: MPL-2.0
//! Audio chunk extraction through an external `ffmpeg` process.
//!
//! Each request runs one process that decodes a time slice of one audio
//! stream to interleaved little-endian `f32` at the requested rate and
//! channel count. Playback speed is applied with a chain of `atempo`
//! filters, since a single `atempo` only accepts factors in [0.5, 2.0].

use super::process::{ensure_available, ManagedChild};
use crate::application::port::{Cancellation, ChunkExtractor, ChunkRequest};
use crate::config::{ATEMPO_MAX, ATEMPO_MIN};
use crate::error::{Error, Result};
use crate::media::MediaLocator;

/// Bytes read from the decoder between cancellation checks.
const READ_BLOCK_BYTES: usize = 64 * 1024;

pub struct FfmpegChunkExtractor {
    ffmpeg: String,
    locator: MediaLocator,
}

impl FfmpegChunkExtractor {
    /// # Errors
    ///
    /// Returns [`Error::BackendUnavailable`] if `ffmpeg` cannot run.
    pub fn new(ffmpeg: &str, locator: MediaLocator) -> Result<Self> {
        ensure_available(ffmpeg, "audio")?;
        Ok(Self {
            ffmpeg: ffmpeg.to_string(),
            locator,
        })
    }

    /// Both the offset and the length are measured in source time, ahead of
    /// any tempo filter.
    fn args(&self, request: &ChunkRequest) -> Vec<String> {
        let start = format!("{:.6}", request.start_secs);
        let duration = format!("{:.6}", request.duration_secs);
        let input_seek = self.locator.supports_input_seek();

        let mut args: Vec<String> = vec!["-v".into(), "error".into()];
        if input_seek {
            args.extend([
                "-nostdin".into(),
                "-ss".into(),
                start.clone(),
                "-t".into(),
                duration.clone(),
            ]);
        }
        args.extend(self.locator.ffmpeg_input_args());
        args.extend([
            "-vn".into(),
            "-map".into(),
            format!("0:a:{}", request.audio_track),
        ]);

        // Stdin cannot seek: trim inside the graph before the tempo change.
        let mut filters = Vec::new();
        if !input_seek {
            filters.push(format!(
                "atrim=start={start}:duration={duration},asetpts=PTS-STARTPTS"
            ));
        }
        if let Some(tempo) = atempo_filter(request.speed) {
            filters.push(tempo);
        }
        if !filters.is_empty() {
            args.extend(["-af".into(), filters.join(",")]);
        }

        args.extend([
            "-f".into(),
            "f32le".into(),
            "-ac".into(),
            request.channels.to_string(),
            "-ar".into(),
            request.sample_rate.to_string(),
            "pipe:1".into(),
        ]);
        args
    }
}

impl ChunkExtractor for FfmpegChunkExtractor {
    fn extract(&self, request: &ChunkRequest, cancel: &dyn Cancellation) -> Result<Vec<f32>> {
        let mut child = ManagedChild::spawn(
            &self.ffmpeg,
            &self.args(request),
            self.locator.stdin_bytes(),
        )
        .map_err(|e| Error::AudioStream(e.to_string()))?;

        let mut bytes = Vec::new();
        let mut block = vec![0u8; READ_BLOCK_BYTES];
        loop {
            if cancel.is_cancelled() {
                child.kill();
                return Err(Error::AudioStream(format!(
                    "chunk {} cancelled",
                    request.index
                )));
            }
            let n = child
                .read_full(&mut block)
                .map_err(|e| Error::AudioStream(e.to_string()))?;
            bytes.extend_from_slice(&block[..n]);
            if n < block.len() {
                break;
            }
        }

        child
            .finish()
            .map_err(|e| Error::AudioStream(e.to_string()))?;

        let whole = bytes.len() - bytes.len() % std::mem::size_of::<f32>();
        Ok(bytemuck::pod_collect_to_vec::<u8, f32>(&bytes[..whole]))
    }
}

/// `atempo` chain reproducing `speed`, or `None` at normal speed.
#[must_use]
pub fn atempo_filter(speed: f64) -> Option<String> {
    if !speed.is_finite() || speed <= 0.0 || (speed - 1.0).abs() < f64::EPSILON {
        return None;
    }

    let mut remaining = speed;
    let mut factors = Vec::new();
    while remaining > ATEMPO_MAX {
        factors.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        factors.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    factors.push(remaining);

    Some(
        factors
            .iter()
            .map(|f| format!("atempo={f:.6}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}
