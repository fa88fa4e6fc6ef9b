// SPDX-License-Identifier: MPL-2.0
//! Live capture playback.
//!
//! A [`Webcam`] polls a capture source at a fixed rate instead of following a
//! media clock. There is nothing to seek and no end of stream; the position
//! is the number of captured frames divided by the poll rate.
//!
//! # Example
//!
//! ```no_run
//! use framepace::config::PlaybackConfig;
//! use framepace::media::CaptureDevice;
//! use framepace::video_player::Webcam;
//!
//! let mut webcam = Webcam::open(CaptureDevice::camera(0), 30, &PlaybackConfig::default())?;
//! webcam.change_resolution(480)?;
//! loop {
//!     if webcam.update()? {
//!         let frame = webcam.frame().expect("a frame was just captured");
//!         // frame.data is packed BGR
//!     }
//! #   break;
//! }
//! webcam.close();
//! # Ok::<(), framepace::error::Error>(())
//! ```

use crate::application::port::{FrameSink, FrameSource};
use crate::config::{PlaybackConfig, MAX_WEBCAM_FPS, MIN_WEBCAM_FPS};
use crate::error::{Error, Result};
use crate::infrastructure::PipeFrameSource;
use crate::media::{resize_frame, CaptureDevice, Interpolation, MediaLocator, VideoFrame};
use std::time::{Duration, Instant};

/// Width that keeps `aspect_ratio` at `height`, rounded up to an even number.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn even_width(height: u32, aspect_ratio: f64) -> u32 {
    let width = (f64::from(height) * aspect_ratio).max(0.0) as u32;
    if width % 2 == 1 {
        width + 1
    } else {
        width
    }
}

fn aspect_of((width, height): (u32, u32)) -> f64 {
    if height == 0 {
        1.0
    } else {
        f64::from(width) / f64::from(height)
    }
}

fn open_capture(device: &CaptureDevice, config: &PlaybackConfig) -> Result<PipeFrameSource> {
    let locator = MediaLocator::device(device.clone());
    PipeFrameSource::open(&locator, config).map_err(|e| match e {
        Error::UnsupportedFormat(reason) => {
            Error::Device(format!("No capture device at {locator}: {reason}"))
        }
        other => other,
    })
}

/// A capture device polled at a fixed frame rate.
pub struct Webcam {
    source: Box<dyn FrameSource>,
    /// Set when the source was opened from a device and can be reopened.
    device: Option<CaptureDevice>,
    config: PlaybackConfig,
    fps: u32,
    interval: Duration,
    interpolation: Interpolation,
    output_size: (u32, u32),
    aspect_ratio: f64,
    current: Option<VideoFrame>,
    frames: u64,
    last_tick: Option<Instant>,
    active: bool,
    closed: bool,
}

impl Webcam {
    /// Opens `device` through the pipe backend and starts capturing.
    ///
    /// `fps` is clamped to the supported poll range.
    ///
    /// # Errors
    ///
    /// - [`Error::BackendUnavailable`] if `ffmpeg` or `ffprobe` cannot run
    /// - [`Error::Device`] if the device cannot be opened
    pub fn open(device: CaptureDevice, fps: u32, config: &PlaybackConfig) -> Result<Self> {
        let source = open_capture(&device, config)?;
        log::debug!(
            "webcam {}:{} opened at {:?}",
            device.input_format,
            device.device,
            source.original_size()
        );
        let mut webcam = Self::with_source(Box::new(source), fps);
        webcam.device = Some(device);
        webcam.config = config.clone();
        Ok(webcam)
    }

    /// Polls a caller-supplied source, which should behave like a live feed.
    #[must_use]
    pub fn with_source(source: Box<dyn FrameSource>, fps: u32) -> Self {
        let fps = fps.clamp(MIN_WEBCAM_FPS, MAX_WEBCAM_FPS);
        let output_size = source.original_size();
        Self {
            source,
            device: None,
            config: PlaybackConfig::default(),
            fps,
            interval: Duration::from_secs_f64(1.0 / f64::from(fps)),
            interpolation: Interpolation::default(),
            output_size,
            aspect_ratio: aspect_of(output_size),
            current: None,
            frames: 0,
            last_tick: None,
            active: true,
            closed: false,
        }
    }

    #[must_use]
    pub fn fps(&self) -> u32 {
        self.fps
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Seconds of capture so far. Not reset by [`Self::stop`].
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn position(&self) -> f64 {
        self.frames as f64 / f64::from(self.fps)
    }

    /// Size the device delivers.
    #[must_use]
    pub fn original_size(&self) -> (u32, u32) {
        self.source.original_size()
    }

    #[must_use]
    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }

    /// Captures a frame if the poll interval has elapsed.
    ///
    /// Returns true when a new frame is current.
    pub fn update(&mut self) -> Result<bool> {
        self.update_at(Instant::now())
    }

    /// [`Self::update`] against an explicit instant.
    pub fn update_at(&mut self, now: Instant) -> Result<bool> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !self.active {
            return Ok(false);
        }
        if self
            .last_tick
            .is_some_and(|last| now.saturating_duration_since(last) < self.interval)
        {
            return Ok(false);
        }
        self.last_tick = Some(now);

        match self.source.next_frame()? {
            Some(frame) => {
                self.current = Some(frame);
                self.frames += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Polls, then hands the current frame to `sink` if it is new or `force`
    /// is set. Returns true when the sink was called.
    pub fn draw(&mut self, sink: &mut dyn FrameSink, force: bool) -> Result<bool> {
        self.draw_at(sink, force, Instant::now())
    }

    /// [`Self::draw`] against an explicit instant.
    pub fn draw_at(&mut self, sink: &mut dyn FrameSink, force: bool, now: Instant) -> Result<bool> {
        let captured = self.update_at(now)?;
        match &self.current {
            Some(frame) if captured || force => {
                sink.present(frame);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    #[must_use]
    pub fn frame(&self) -> Option<&VideoFrame> {
        self.current.as_ref()
    }

    pub fn take_frame(&mut self) -> Option<VideoFrame> {
        self.current.take()
    }

    pub fn play(&mut self) {
        self.active = true;
    }

    /// Stops polling and drops the current frame.
    pub fn stop(&mut self) {
        self.active = false;
        self.current = None;
    }

    /// Interpolation used by later resizes.
    pub fn set_interp(&mut self, interp: Interpolation) {
        self.interpolation = interp;
    }

    /// Changes the size of delivered frames, including the current one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VideoStream`] for a zero-sized target.
    pub fn resize(&mut self, size: (u32, u32)) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.source.resize(Some(size), self.interpolation)?;
        self.output_size = size;
        if let Some(frame) = self.current.take() {
            self.current = Some(if (frame.width, frame.height) == size {
                frame
            } else {
                resize_frame(&frame, size, self.interpolation)?
            });
        }
        Ok(())
    }

    /// Scales to `height`, keeping the aspect ratio with an even width.
    pub fn change_resolution(&mut self, height: u32) -> Result<()> {
        self.resize((even_width(height, self.aspect_ratio), height))
    }

    /// Asks the device to capture at `size`.
    ///
    /// Returns true when the device delivers exactly that size; otherwise
    /// the closest mode it offers stays in use.
    ///
    /// # Errors
    ///
    /// - [`Error::Device`] if the source was not opened from a device, or
    ///   the device cannot be reopened
    /// - [`Error::BackendUnavailable`] if `ffmpeg` is gone
    pub fn resize_capture(&mut self, size: (u32, u32)) -> Result<bool> {
        if self.closed {
            return Err(Error::Closed);
        }
        let Some(device) = &self.device else {
            return Err(Error::Device(
                "capture size is fixed for caller-supplied sources".to_string(),
            ));
        };
        let device = device.clone().with_capture_size(size);
        let follow_original = self.output_size == self.source.original_size();

        let mut source: Box<dyn FrameSource> = Box::new(open_capture(&device, &self.config)?);
        self.source.close();
        let original = source.original_size();
        if follow_original {
            self.output_size = original;
        } else {
            source.resize(Some(self.output_size), self.interpolation)?;
        }
        self.source = source;
        self.device = Some(device);
        self.aspect_ratio = aspect_of(original);

        if original != size {
            log::debug!("capture size {size:?} unavailable, using {original:?}");
        }
        Ok(original == size)
    }

    /// Releases the device. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.stop();
        self.source.close();
        self.closed = true;
    }
}

impl Drop for Webcam {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingFrameSink, ScriptedSource, SourceLogHandle};
    use crate::test_utils::assert_abs_diff_eq;

    fn webcam(fps: u32) -> (Webcam, SourceLogHandle) {
        let source = ScriptedSource::new(10_000, 30.0, (640, 480)).sequential_only();
        let log = source.log_handle();
        (Webcam::with_source(Box::new(source), fps), log)
    }

    fn ms(start: Instant, millis: u64) -> Instant {
        start + Duration::from_millis(millis)
    }

    #[test]
    fn width_rounds_up_to_even() {
        assert_eq!(even_width(480, 16.0 / 9.0), 854);
        assert_eq!(even_width(720, 4.0 / 3.0), 960);
        assert_eq!(even_width(101, 1.0), 102);
    }

    #[test]
    fn polling_is_throttled_to_fps() {
        let (mut cam, log) = webcam(10);
        let start = Instant::now();
        assert!(cam.update_at(start).unwrap());
        assert!(!cam.update_at(ms(start, 50)).unwrap());
        assert!(!cam.update_at(ms(start, 99)).unwrap());
        assert!(cam.update_at(ms(start, 100)).unwrap());
        assert_eq!(log.snapshot().decoded, vec![0, 1]);
        assert_abs_diff_eq!(cam.position(), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn fps_is_clamped() {
        assert_eq!(webcam(0).0.fps(), MIN_WEBCAM_FPS);
        assert_eq!(webcam(10_000).0.fps(), MAX_WEBCAM_FPS);
    }

    #[test]
    fn stop_drops_frame_but_keeps_position() {
        let (mut cam, _) = webcam(10);
        let start = Instant::now();
        cam.update_at(start).unwrap();
        cam.stop();
        assert!(cam.frame().is_none());
        assert!(!cam.update_at(ms(start, 500)).unwrap());
        assert_abs_diff_eq!(cam.position(), 0.1, epsilon = 1e-9);

        cam.play();
        assert!(cam.update_at(ms(start, 600)).unwrap());
        assert_eq!(cam.frame().unwrap().index, 1);
    }

    #[test]
    fn change_resolution_keeps_aspect_with_even_width() {
        let (mut cam, log) = webcam(30);
        cam.update_at(Instant::now()).unwrap();
        cam.change_resolution(361).unwrap();

        assert_eq!(cam.output_size(), (482, 361));
        let frame = cam.frame().unwrap();
        assert_eq!((frame.width, frame.height), (482, 361));
        assert_eq!(log.snapshot().resizes, vec![Some((482, 361))]);
        assert_eq!(cam.original_size(), (640, 480));
    }

    #[test]
    fn draw_presents_new_frames_unless_forced() {
        let (mut cam, _) = webcam(10);
        let mut sink = RecordingFrameSink::default();
        let start = Instant::now();
        assert!(cam.draw_at(&mut sink, false, start).unwrap());
        assert!(!cam.draw_at(&mut sink, false, ms(start, 10)).unwrap());
        assert!(cam.draw_at(&mut sink, true, ms(start, 20)).unwrap());
        assert!(cam.draw_at(&mut sink, false, ms(start, 120)).unwrap());
        assert_eq!(sink.indices(), vec![0, 0, 1]);
    }

    #[test]
    fn capture_size_needs_a_device() {
        let (mut cam, _) = webcam(30);
        assert!(matches!(cam.resize_capture((320, 240)), Err(Error::Device(_))));
    }

    #[test]
    fn close_is_idempotent() {
        let (mut cam, log) = webcam(30);
        cam.close();
        cam.close();
        assert!(cam.is_closed());
        assert!(log.snapshot().closed);
        assert_eq!(cam.update(), Err(Error::Closed));
    }

    #[test]
    fn open_without_ffmpeg_is_unavailable() {
        let config = PlaybackConfig {
            ffmpeg_path: "framepace-missing-ffmpeg".to_string(),
            ffprobe_path: "framepace-missing-ffprobe".to_string(),
            ..PlaybackConfig::default()
        };
        let result = Webcam::open(CaptureDevice::camera(0), 30, &config);
        assert!(matches!(result, Err(Error::BackendUnavailable { .. })));
    }
}
