// SPDX-License-Identifier: MPL-2.0
//! In-memory stand-ins for the external collaborators.
//!
//! These drive [`crate::video_player::PlaybackSession`] without FFmpeg or an
//! audio device: a scripted frame source whose pixels encode the frame index,
//! a chunk extractor that synthesizes a tone, and sinks that record what they
//! were given. Handles returned by the `*_handle()` methods stay valid after
//! the component has been boxed and moved into a session.

use crate::application::port::{
    AudioChunk, AudioSink, BackendKind, Cancellation, Capabilities, ChunkExtractor, ChunkRequest,
    FrameSink, FrameSource,
};
use crate::error::{Error, Result};
use crate::media::{AudioStreamInfo, ColourFormat, Interpolation, SourceInfo, VideoFrame};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a [`ScriptedSource`] was asked to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceLog {
    /// Indices returned by `next_frame`, in order.
    pub decoded: Vec<usize>,
    /// Targets of `seek_to_frame` calls that succeeded.
    pub seeks: Vec<usize>,
    /// Presentation times passed along with `seeks`.
    pub seek_times: Vec<f64>,
    pub rewinds: usize,
    pub resizes: Vec<Option<(u32, u32)>>,
    pub closed: bool,
}

/// Shared view of a [`ScriptedSource`]'s activity.
#[derive(Debug, Clone, Default)]
pub struct SourceLogHandle(Arc<Mutex<SourceLog>>);

impl SourceLogHandle {
    #[must_use]
    pub fn snapshot(&self) -> SourceLog {
        lock(&self.0).clone()
    }

    /// Forgets everything recorded so far.
    pub fn reset(&self) {
        *lock(&self.0) = SourceLog::default();
    }
}

/// Frame source over synthetic frames. Every byte of frame `i` is `i % 256`.
#[derive(Debug)]
pub struct ScriptedSource {
    info: SourceInfo,
    capabilities: Capabilities,
    position: usize,
    output: Option<(u32, u32)>,
    fail_at: Option<usize>,
    closed: bool,
    log: SourceLogHandle,
}

impl ScriptedSource {
    /// Constant-rate source with random seek and a known frame count.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(frame_count: usize, frame_rate: f64, size: (u32, u32)) -> Self {
        let colour = ColourFormat::Rgb;
        Self {
            info: SourceInfo {
                width: size.0,
                height: size.1,
                frame_rate,
                frame_count: Some(frame_count),
                duration_secs: frame_count as f64 / frame_rate,
                colour,
                audio: None,
                timestamps: None,
            },
            capabilities: Capabilities {
                sequential_read: true,
                random_seek: true,
                frame_count_known: true,
                colour,
            },
            position: 0,
            output: None,
            fail_at: None,
            closed: false,
            log: SourceLogHandle::default(),
        }
    }

    /// Drops the random-seek capability, like a pipe backend.
    #[must_use]
    pub fn sequential_only(mut self) -> Self {
        self.capabilities.random_seek = false;
        self
    }

    #[must_use]
    pub fn with_colour(mut self, colour: ColourFormat) -> Self {
        self.info.colour = colour;
        self.capabilities.colour = colour;
        self
    }

    /// Per-frame timestamps known at open; the count must match `frame_count`.
    #[must_use]
    pub fn with_timestamps(mut self, timestamps: Vec<f64>) -> Self {
        if let Some(last) = timestamps.last() {
            self.info.duration_secs = last + 1.0 / self.info.frame_rate;
        }
        self.info.frame_count = Some(timestamps.len());
        self.info.timestamps = Some(timestamps);
        self
    }

    /// Declares an audio stream so the session builds an audio pipeline.
    #[must_use]
    pub fn with_audio(mut self, channels: u16, sample_rate: u32) -> Self {
        self.info.audio = Some(AudioStreamInfo {
            channels,
            sample_rate,
            codec_name: "pcm_f32le".to_string(),
            track_count: 1,
        });
        self
    }

    /// Decoding frame `index` fails with a video stream error.
    #[must_use]
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    #[must_use]
    pub fn log_handle(&self) -> SourceLogHandle {
        self.log.clone()
    }

    #[allow(clippy::cast_precision_loss)]
    fn pts(&self, index: usize) -> f64 {
        match &self.info.timestamps {
            Some(ts) => ts.get(index).copied().unwrap_or(0.0),
            None => index as f64 / self.info.frame_rate,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn backend(&self) -> BackendKind {
        BackendKind::Custom
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    #[allow(clippy::cast_possible_truncation)]
    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.fail_at == Some(self.position) {
            return Err(Error::VideoStream(format!(
                "scripted failure at frame {}",
                self.position
            )));
        }
        if self.position >= self.info.effective_frame_count() {
            return Ok(None);
        }
        let index = self.position;
        self.position += 1;
        lock(&self.log.0).decoded.push(index);

        let (width, height) = self.output_size();
        Ok(Some(VideoFrame {
            index,
            pts_secs: self.pts(index),
            width,
            height,
            colour: self.info.colour,
            data: vec![(index % 256) as u8; VideoFrame::expected_len(width, height, self.info.colour)],
        }))
    }

    fn seek_to_frame(&mut self, index: usize, pts_secs: f64) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !self.capabilities.random_seek {
            return Err(Error::SeekUnsupported);
        }
        self.position = index.min(self.info.effective_frame_count());
        let mut log = lock(&self.log.0);
        log.seeks.push(index);
        log.seek_times.push(pts_secs);
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.position = 0;
        lock(&self.log.0).rewinds += 1;
        Ok(())
    }

    fn resize(&mut self, size: Option<(u32, u32)>, _interp: Interpolation) -> Result<()> {
        self.output = size;
        lock(&self.log.0).resizes.push(size);
        Ok(())
    }

    fn output_size(&self) -> (u32, u32) {
        self.output.unwrap_or((self.info.width, self.info.height))
    }

    fn close(&mut self) {
        self.closed = true;
        lock(&self.log.0).closed = true;
    }
}

#[derive(Debug, Default)]
struct ExtractorScript {
    delay: Duration,
    fail_first_attempt: bool,
    always_fail: bool,
    audio_end_secs: Option<f64>,
    requests: Vec<ChunkRequest>,
}

/// Chunk extractor producing a 440 Hz tone of the requested length.
#[derive(Debug, Clone, Default)]
pub struct SyntheticExtractor(Arc<Mutex<ExtractorScript>>);

impl SyntheticExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Each extraction takes `delay`, checking for cancellation meanwhile.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        lock(&self.0).delay = delay;
        self
    }

    /// First attempts fail; aligned retries succeed.
    #[must_use]
    pub fn failing_first_attempt(self) -> Self {
        lock(&self.0).fail_first_attempt = true;
        self
    }

    #[must_use]
    pub fn always_failing(self) -> Self {
        lock(&self.0).always_fail = true;
        self
    }

    /// Requests starting at or after `secs` decode to nothing.
    #[must_use]
    pub fn with_audio_end(self, secs: f64) -> Self {
        lock(&self.0).audio_end_secs = Some(secs);
        self
    }

    /// Attempt numbers of every request received, in arrival order.
    #[must_use]
    pub fn attempts(&self) -> Vec<u8> {
        lock(&self.0).requests.iter().map(|r| r.attempt).collect()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<ChunkRequest> {
        lock(&self.0).requests.clone()
    }
}

impl ChunkExtractor for SyntheticExtractor {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn extract(&self, request: &ChunkRequest, cancel: &dyn Cancellation) -> Result<Vec<f32>> {
        let (delay, fail, audio_end) = {
            let mut script = lock(&self.0);
            script.requests.push(request.clone());
            let fail =
                script.always_fail || (script.fail_first_attempt && request.attempt == 0);
            (script.delay, fail, script.audio_end_secs)
        };

        let step = Duration::from_millis(2);
        let mut waited = Duration::ZERO;
        while waited < delay {
            if cancel.is_cancelled() {
                return Err(Error::AudioStream("extraction cancelled".to_string()));
            }
            std::thread::sleep(step);
            waited += step;
        }
        if fail {
            return Err(Error::AudioStream(format!(
                "synthetic failure for chunk {}",
                request.index
            )));
        }
        if audio_end.is_some_and(|end| request.start_secs >= end) {
            return Ok(Vec::new());
        }

        let speed = if request.speed > 0.0 { request.speed } else { 1.0 };
        let rate = f64::from(request.sample_rate);
        let frames = (request.duration_secs * rate / speed).round().max(0.0) as usize;
        let channels = usize::from(request.channels.max(1));
        let mut samples = Vec::with_capacity(frames * channels);
        for n in 0..frames {
            let t = n as f64 / rate;
            let value = (0.25 * (2.0 * std::f64::consts::PI * 440.0 * t).sin()) as f32;
            samples.extend(std::iter::repeat_n(value, channels));
        }
        Ok(samples)
    }
}

/// Everything a [`RecordingAudioSink`] received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkRecord {
    pub chunks: Vec<AudioChunk>,
    /// Seconds pushed since the last `clear` or `drain`.
    pub queued_secs: f64,
    pub paused: bool,
    pub volume: f32,
    pub muted: bool,
    pub clears: usize,
}

/// Shared view of a [`RecordingAudioSink`].
#[derive(Debug, Clone, Default)]
pub struct SinkHandle(Arc<Mutex<SinkRecord>>);

impl SinkHandle {
    #[must_use]
    pub fn snapshot(&self) -> SinkRecord {
        lock(&self.0).clone()
    }

    /// Pretends the device played everything queued.
    pub fn drain(&self) {
        lock(&self.0).queued_secs = 0.0;
    }
}

/// Audio sink that keeps every chunk it is handed. Starts paused, like a
/// real output stream.
#[derive(Debug)]
pub struct RecordingAudioSink {
    record: SinkHandle,
    format: (u32, u16),
}

impl RecordingAudioSink {
    #[must_use]
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let record = SinkHandle::default();
        {
            let mut state = lock(&record.0);
            state.paused = true;
            state.volume = 1.0;
        }
        Self {
            record,
            format: (sample_rate, channels),
        }
    }

    #[must_use]
    pub fn handle(&self) -> SinkHandle {
        self.record.clone()
    }
}

impl AudioSink for RecordingAudioSink {
    fn push(&mut self, chunk: AudioChunk) -> Result<()> {
        let mut record = lock(&self.record.0);
        record.queued_secs += chunk.playback_secs();
        record.chunks.push(chunk);
        Ok(())
    }

    fn queued_secs(&self) -> f64 {
        lock(&self.record.0).queued_secs
    }

    fn pause(&mut self) {
        lock(&self.record.0).paused = true;
    }

    fn resume(&mut self) {
        lock(&self.record.0).paused = false;
    }

    fn clear(&mut self) {
        let mut record = lock(&self.record.0);
        record.queued_secs = 0.0;
        record.clears += 1;
    }

    fn set_volume(&mut self, volume: f32) {
        lock(&self.record.0).volume = volume;
    }

    fn set_muted(&mut self, muted: bool) {
        lock(&self.record.0).muted = muted;
    }

    fn output_format(&self) -> (u32, u16) {
        self.format
    }
}

/// Frame sink that remembers the index, size and colour of every frame.
#[derive(Debug, Clone, Default)]
pub struct RecordingFrameSink {
    pub presented: Vec<(usize, (u32, u32), ColourFormat)>,
}

impl RecordingFrameSink {
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        self.presented.iter().map(|(index, _, _)| *index).collect()
    }
}

impl FrameSink for RecordingFrameSink {
    fn present(&mut self, frame: &VideoFrame) {
        self.presented
            .push((frame.index, (frame.width, frame.height), frame.colour));
    }
}
