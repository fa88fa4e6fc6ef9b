// SPDX-License-Identifier: MPL-2.0
//! Pipe backend: raw BGR frames read from an external `ffmpeg` process.
//!
//! Works wherever the `ffmpeg` binary does, including in-memory media fed
//! through stdin and live capture devices. Seeking respawns the process with
//! an input-side `-ss`, which neither stdin nor a device can support, so
//! those sources are sequential only.

use super::probe::probe_source;
use super::process::{ensure_available, ManagedChild};
use crate::application::port::{BackendKind, Capabilities, FrameSource};
use crate::config::PlaybackConfig;
use crate::error::{Error, Result};
use crate::media::{resize_frame, ColourFormat, Interpolation, MediaLocator, SourceInfo, VideoFrame};
use crate::video_player::time_units::frame_start_secs;

const COLOUR: ColourFormat = ColourFormat::Bgr;

pub struct PipeFrameSource {
    ffmpeg: String,
    locator: MediaLocator,
    info: SourceInfo,
    output_size: (u32, u32),
    interpolation: Interpolation,
    child: Option<ManagedChild>,
    /// Size the running child scales to.
    child_size: (u32, u32),
    next_index: usize,
    /// Frame index and presentation time the next child starts from.
    start: (usize, f64),
    closed: bool,
}

impl PipeFrameSource {
    /// Probes `locator` and prepares a decoder process.
    ///
    /// # Errors
    ///
    /// - [`Error::BackendUnavailable`] if `ffmpeg` or `ffprobe` cannot run
    /// - [`Error::UnsupportedFormat`] if the media has no readable video
    pub fn open(locator: &MediaLocator, config: &PlaybackConfig) -> Result<Self> {
        ensure_available(&config.ffmpeg_path, "pipe")?;
        ensure_available(&config.ffprobe_path, "pipe")?;

        let info = probe_source(&config.ffprobe_path, locator, COLOUR).map_err(|e| match e {
            Error::Io(reason) => Error::UnsupportedFormat(reason),
            other => other,
        })?;

        log::debug!(
            "pipe opened {locator}: {}x{} @ {:.3} fps",
            info.width,
            info.height,
            info.frame_rate
        );

        Ok(Self {
            ffmpeg: config.ffmpeg_path.clone(),
            locator: locator.clone(),
            output_size: (info.width, info.height),
            child_size: (info.width, info.height),
            info,
            interpolation: config.interpolation,
            child: None,
            next_index: 0,
            start: (0, 0.0),
            closed: false,
        })
    }

    /// Command line for a decoder starting at `start_secs`.
    fn decoder_args(&self, start_secs: f64) -> Vec<String> {
        let mut args: Vec<String> = vec!["-v".into(), "error".into()];
        if self.locator.stdin_bytes().is_none() {
            args.push("-nostdin".into());
        }
        if start_secs > 0.0 && self.locator.supports_input_seek() {
            args.extend(["-ss".into(), format!("{start_secs:.6}")]);
        }
        args.extend(self.locator.ffmpeg_input_args());
        // One output frame per decoded frame; rawvideo would otherwise
        // duplicate and drop frames to a constant rate.
        args.extend([
            "-an".into(),
            "-sn".into(),
            "-fps_mode".into(),
            "passthrough".into(),
        ]);

        let (width, height) = self.output_size;
        if (width, height) != (self.info.width, self.info.height) {
            args.extend([
                "-vf".into(),
                format!(
                    "scale={width}:{height}:flags={}",
                    self.interpolation.ffmpeg_flag()
                ),
            ]);
        }
        args.extend([
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            COLOUR.ffmpeg_pix_fmt().into(),
            "pipe:1".into(),
        ]);
        args
    }

    fn ensure_child(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.child.is_none() {
            let args = self.decoder_args(self.pts_for(self.next_index));
            self.child = Some(ManagedChild::spawn(
                &self.ffmpeg,
                &args,
                self.locator.stdin_bytes(),
            )?);
            self.child_size = self.output_size;
        }
        Ok(())
    }

    fn stop_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            child.kill();
        }
    }

    fn pts_for(&self, index: usize) -> f64 {
        let (start_index, start_secs) = self.start;
        self.info
            .timestamps
            .as_ref()
            .and_then(|pts| pts.get(index).copied())
            .unwrap_or_else(|| {
                if index >= start_index {
                    start_secs + frame_start_secs(index - start_index, self.info.frame_rate)
                } else {
                    frame_start_secs(index, self.info.frame_rate)
                }
            })
    }
}

impl FrameSource for PipeFrameSource {
    fn backend(&self) -> BackendKind {
        BackendKind::Pipe
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sequential_read: true,
            random_seek: self.locator.supports_input_seek(),
            frame_count_known: self.info.frame_count.is_some(),
            colour: COLOUR,
        }
    }

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        self.ensure_child()?;
        let (width, height) = self.child_size;
        let frame_len = VideoFrame::expected_len(width, height, COLOUR);
        let mut data = vec![0u8; frame_len];

        let read = match self.child.as_mut() {
            Some(child) => child.read_full(&mut data)?,
            None => 0,
        };

        if read < frame_len {
            if read > 0 {
                log::warn!("pipe decoder returned a truncated frame ({read}/{frame_len} bytes)");
            }
            if let Some(child) = self.child.take() {
                child
                    .finish()
                    .map_err(|e| Error::VideoStream(e.to_string()))?;
            }
            return Ok(None);
        }

        let frame = VideoFrame {
            index: self.next_index,
            pts_secs: self.pts_for(self.next_index),
            width,
            height,
            colour: COLOUR,
            data,
        };
        self.next_index += 1;

        // Resized while a non-restartable child was running.
        if self.child_size != self.output_size {
            return resize_frame(&frame, self.output_size, self.interpolation).map(Some);
        }
        Ok(Some(frame))
    }

    fn seek_to_frame(&mut self, index: usize, pts_secs: f64) -> Result<()> {
        if !self.locator.supports_input_seek() {
            return Err(Error::SeekUnsupported);
        }
        self.stop_child();
        self.next_index = index;
        self.start = (index, pts_secs.max(0.0));
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.stop_child();
        self.next_index = 0;
        self.start = (0, 0.0);
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

        // Restart scaled at the current position when the input allows it.
        let restartable =
            self.locator.supports_input_seek() || self.locator.is_live() || self.next_index == 0;
        if self.child.is_some() && restartable {
            self.stop_child();
        }
        Ok(())
    }

    fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    fn close(&mut self) {
        self.stop_child();
        self.closed = true;
    }
}
