// SPDX-License-Identifier: MPL-2.0
//! The playback clock: the synchronizer between wall-clock time, the frame
//! source and the audio pipeline.
//!
//! The clock owns [`ClockState`] and is its only writer. The caller drives it
//! by calling [`PlaybackClock::update`] once per render tick; each tick
//! advances the media position by the elapsed wall-clock time times the
//! playback speed, resolves the frame index for that position and pulls the
//! frame from the source when it changed.
//!
//! Seeking only moves the bookkeeping. The frame for the new position is
//! decoded by the next `update` or by [`PlaybackClock::force_frame`].

use super::audio_pipeline::{AudioChunkPipeline, ChunkPoll, PipelineSettings, PipelineStats};
use super::state::{ClockState, PlaybackState};
use super::timestamps::{TimestampIndex, TimestampTable};
use super::{PlaybackSpeed, Volume};
use crate::application::port::{AudioSink, FrameSink, FrameSource};
use crate::config::PlaybackConfig;
use crate::error::{Error, Result};
use crate::media::{resize_frame, Interpolation, VideoFrame};
use std::time::{Duration, Instant};

/// Tunables the clock reads on every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockSettings {
    /// Largest forward jump, in frames, served by decoding through instead of seeking.
    pub max_sequential_gap: usize,
    /// How long an update may wait for a late audio chunk when the sink is dry.
    pub audio_wait: Duration,
    /// Audio kept queued in the sink ahead of the playhead, in seconds.
    pub audio_lead_secs: f64,
    pub reverse_memory_limit_bytes: u64,
    pub interpolation: Interpolation,
}

impl ClockSettings {
    #[must_use]
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self {
            max_sequential_gap: config.max_sequential_gap,
            audio_wait: config.audio_wait(),
            audio_lead_secs: config.audio_lead_secs,
            reverse_memory_limit_bytes: config.reverse_memory_limit_bytes(),
            interpolation: config.interpolation,
        }
    }
}

/// The live audio path: one pipeline feeding one sink.
pub struct ClockAudio {
    pub pipeline: AudioChunkPipeline,
    pub sink: Box<dyn AudioSink>,
}

enum AudioFeed {
    Flowing,
    Starved,
    Lost(Error),
}

/// Playback synchronizer.
pub struct PlaybackClock {
    state: ClockState,
    source: Box<dyn FrameSource>,
    audio: Option<ClockAudio>,
    timestamps: TimestampIndex,
    duration_secs: f64,
    settings: ClockSettings,
    last_tick: Option<Instant>,
    current: Option<VideoFrame>,
    /// Index of the frame in `current`, `None` after a seek.
    displayed: Option<usize>,
    /// `current` has not been presented yet.
    fresh: bool,
    /// Index the next `next_frame()` call will return, when known.
    read_head: Option<usize>,
    reverse_frames: Option<Vec<VideoFrame>>,
}

impl PlaybackClock {
    /// Creates a stopped clock at position 0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(
        source: Box<dyn FrameSource>,
        audio: Option<ClockAudio>,
        timestamps: TimestampIndex,
        settings: ClockSettings,
    ) -> Self {
        let info = source.info();
        let duration_secs = if info.duration_secs.is_finite() && info.duration_secs > 0.0 {
            info.duration_secs
        } else {
            timestamps.table().frame_count() as f64 / timestamps.table().avg_frame_rate()
        };
        let mut clock = Self {
            state: ClockState::default(),
            source,
            audio,
            timestamps,
            duration_secs,
            settings,
            last_tick: None,
            current: None,
            displayed: None,
            fresh: false,
            read_head: Some(0),
            reverse_frames: None,
        };
        let (volume, muted) = (clock.state.volume.value(), clock.state.muted);
        if let Some(audio) = clock.audio.as_mut() {
            audio.sink.set_volume(volume);
            audio.sink.set_muted(muted);
        }
        clock
    }

    #[must_use]
    pub fn state(&self) -> &ClockState {
        &self.state
    }

    #[must_use]
    pub fn position(&self) -> f64 {
        self.state.position_secs
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration_secs
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.timestamps.table().frame_count()
    }

    #[must_use]
    pub fn timestamps(&self) -> &TimestampTable {
        self.timestamps.table()
    }

    pub fn timestamps_mut(&mut self) -> &mut TimestampIndex {
        &mut self.timestamps
    }

    #[must_use]
    pub fn source(&self) -> &dyn FrameSource {
        self.source.as_ref()
    }

    #[must_use]
    pub fn settings(&self) -> &ClockSettings {
        &self.settings
    }

    #[must_use]
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    #[must_use]
    pub fn audio_settings(&self) -> Option<&PipelineSettings> {
        self.audio.as_ref().map(|audio| audio.pipeline.settings())
    }

    #[must_use]
    pub fn audio_stats(&self) -> Option<PipelineStats> {
        self.audio.as_ref().map(|audio| audio.pipeline.stats())
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.state.ended
    }

    /// Advances the clock to the current instant.
    ///
    /// Returns `Ok(true)` when a new frame became current.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VideoStream`] if the frame source failed; the clock
    /// is stopped when that happens.
    pub fn update(&mut self) -> Result<bool> {
        self.update_at(Instant::now())
    }

    /// [`Self::update`] with an explicit notion of "now".
    pub fn update_at(&mut self, now: Instant) -> Result<bool> {
        if self.timestamps.poll() {
            self.state.frame_index = self.timestamps.table().frame_for_time(self.state.position_secs);
        }
        if !self.state.playback.is_playing() {
            return Ok(false);
        }

        let elapsed = self
            .last_tick
            .map_or(0.0, |prev| now.saturating_duration_since(prev).as_secs_f64());
        self.last_tick = Some(now);

        self.state.buffering = self.feed_audio();
        let delta = if self.state.buffering {
            0.0
        } else {
            elapsed * self.state.speed.value()
        };
        if delta > 0.0 {
            let position = if self.state.reverse {
                self.state.position_secs - delta
            } else {
                self.state.position_secs + delta
            };
            self.state.position_secs = position.clamp(0.0, self.duration_secs);
            self.state.frame_index = self.timestamps.table().frame_for_time(self.state.position_secs);
        }

        let new_frame = match self.present(self.state.frame_index) {
            Ok(new_frame) => new_frame,
            Err(e) => {
                self.halt(&e);
                return Err(e);
            }
        };

        let at_end = if self.state.reverse {
            self.state.position_secs <= 0.0
        } else {
            self.state.position_secs >= self.duration_secs
        };
        if at_end {
            self.reach_end();
        }
        Ok(new_frame)
    }

    fn reach_end(&mut self) {
        if self.state.looping {
            let restart_at = if self.state.reverse {
                self.duration_secs
            } else {
                0.0
            };
            log::debug!("end of stream reached, looping to {restart_at:.3}s");
            let index = self.timestamps.table().frame_for_time(restart_at);
            self.jump_to(restart_at, index);
        } else {
            log::debug!("end of stream reached at {:.3}s", self.state.position_secs);
            self.state.playback = PlaybackState::Stopped;
            self.state.ended = true;
            self.state.buffering = false;
            if let Some(audio) = self.audio.as_mut() {
                audio.sink.pause();
            }
        }
    }

    fn halt(&mut self, error: &Error) {
        log::error!("video decode failed, stopping playback: {error}");
        self.state.playback = PlaybackState::Stopped;
        self.state.buffering = false;
        self.read_head = None;
        if let Some(audio) = self.audio.as_mut() {
            audio.sink.pause();
        }
    }

    /// Pushes ready chunks to the sink until the lead target is met.
    ///
    /// Returns true when the sink is dry and the next chunk is still pending.
    fn feed_audio(&mut self) -> bool {
        if self.state.reverse {
            return false;
        }
        let lead = self.settings.audio_lead_secs;
        let wait = self.settings.audio_wait;
        let Some(audio) = self.audio.as_mut() else {
            return false;
        };
        audio.pipeline.fill_window();

        let outcome = loop {
            let queued = audio.sink.queued_secs();
            if queued >= lead {
                break AudioFeed::Flowing;
            }
            let timeout = if queued <= 0.0 { wait } else { Duration::ZERO };
            match audio.pipeline.take_next(timeout) {
                ChunkPoll::Ready(chunk) => {
                    if let Err(e) = audio.sink.push(chunk) {
                        break AudioFeed::Lost(e);
                    }
                }
                ChunkPoll::Pending if queued <= 0.0 => break AudioFeed::Starved,
                ChunkPoll::Pending | ChunkPoll::Exhausted => break AudioFeed::Flowing,
                ChunkPoll::Failed(e) => break AudioFeed::Lost(e),
            }
        };

        match outcome {
            AudioFeed::Flowing => false,
            AudioFeed::Starved => true,
            AudioFeed::Lost(e) => {
                log::warn!("continuing without audio: {e}");
                self.disable_audio();
                false
            }
        }
    }

    /// Tears down the audio path; video keeps playing.
    pub fn disable_audio(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            audio.pipeline.close();
            audio.sink.clear();
            audio.sink.pause();
        }
    }

    /// Swaps in a new audio pipeline, for example after a track change.
    pub fn replace_pipeline(&mut self, pipeline: AudioChunkPipeline) {
        if let Some(audio) = self.audio.as_mut() {
            audio.pipeline.close();
            audio.sink.clear();
            audio.pipeline = pipeline;
            audio
                .pipeline
                .restart(self.state.position_secs, self.state.speed.value());
        }
    }

    fn restart_audio(&mut self) {
        let (position, speed) = (self.state.position_secs, self.state.speed.value());
        if let Some(audio) = self.audio.as_mut() {
            audio.sink.clear();
            audio.pipeline.restart(position, speed);
        }
    }

    fn present(&mut self, target: usize) -> Result<bool> {
        if self.displayed == Some(target) {
            return Ok(false);
        }
        let frame = match &self.reverse_frames {
            Some(frames) => frames.get(target).or_else(|| frames.last()).cloned(),
            None => self.fetch(target)?,
        };
        match frame {
            Some(frame) => {
                self.displayed = Some(target);
                self.current = Some(frame);
                self.fresh = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Brings frame `target` out of the source with the cheapest positioning.
    fn fetch(&mut self, target: usize) -> Result<Option<VideoFrame>> {
        let sequential = self
            .read_head
            .is_some_and(|head| target >= head && target - head <= self.settings.max_sequential_gap);

        if !sequential {
            let mut positioned = false;
            if self.source.capabilities().random_seek {
                let pts_secs = self.timestamps.table().time_for_frame(target);
                match self.source.seek_to_frame(target, pts_secs) {
                    Ok(()) => {
                        self.read_head = Some(target);
                        positioned = true;
                    }
                    Err(Error::SeekUnsupported) => {}
                    Err(e) => return Err(e),
                }
            }
            if !positioned && self.read_head.is_none_or(|head| target < head) {
                self.source.rewind()?;
                self.read_head = Some(0);
            }
        }

        let mut last = None;
        loop {
            match self.source.next_frame()? {
                Some(frame) => {
                    self.read_head = Some(frame.index + 1);
                    if frame.index >= target {
                        return Ok(Some(frame));
                    }
                    last = Some(frame);
                }
                None => {
                    self.read_head = None;
                    return Ok(last);
                }
            }
        }
    }

    /// Decodes the frame for the current position even when not playing.
    ///
    /// Returns true when the current frame changed.
    pub fn force_frame(&mut self) -> Result<bool> {
        self.timestamps.poll();
        match self.present(self.state.frame_index) {
            Ok(changed) => Ok(changed),
            Err(e) => {
                self.halt(&e);
                Err(e)
            }
        }
    }

    /// Runs one update and hands the current frame to `sink` if it is new or
    /// `force` is set. Returns true when the sink was called.
    pub fn draw(&mut self, sink: &mut dyn FrameSink, force: bool) -> Result<bool> {
        self.update()?;
        if force && self.displayed != Some(self.state.frame_index) {
            self.force_frame()?;
        }
        match &self.current {
            Some(frame) if self.fresh || force => {
                sink.present(frame);
                self.fresh = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    #[must_use]
    pub fn frame(&self) -> Option<&VideoFrame> {
        self.current.as_ref()
    }

    /// Moves the current frame out. The next draw or force decodes it again.
    pub fn take_frame(&mut self) -> Option<VideoFrame> {
        self.fresh = false;
        self.displayed = None;
        self.current.take()
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Stopped → Playing (restarting if the stream had ended), Paused → Playing.
    pub fn play(&mut self) {
        match self.state.playback {
            PlaybackState::Playing => {}
            PlaybackState::Paused => self.resume(),
            PlaybackState::Stopped => {
                if self.state.ended {
                    let start = if self.state.reverse {
                        self.duration_secs
                    } else {
                        0.0
                    };
                    let index = self.timestamps.table().frame_for_time(start);
                    self.jump_to(start, index);
                }
                self.state.ended = false;
                self.state.playback = PlaybackState::Playing;
                self.last_tick = None;
                self.resume_sink();
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state.playback.is_playing() {
            self.state.playback = PlaybackState::Paused;
            self.state.buffering = false;
            self.last_tick = None;
            if let Some(audio) = self.audio.as_mut() {
                audio.sink.pause();
            }
        }
    }

    pub fn resume(&mut self) {
        if self.state.playback.is_paused() {
            self.state.playback = PlaybackState::Playing;
            self.last_tick = None;
            self.resume_sink();
        }
    }

    pub fn toggle_pause(&mut self) {
        match self.state.playback {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.resume(),
            PlaybackState::Stopped => self.play(),
        }
    }

    /// Any state → Stopped, back at the beginning.
    pub fn stop(&mut self) {
        self.state.playback = PlaybackState::Stopped;
        self.state.buffering = false;
        self.state.ended = false;
        if let Some(audio) = self.audio.as_mut() {
            audio.sink.pause();
        }
        self.jump_to(0.0, 0);
    }

    /// Seeks to the beginning and plays.
    pub fn restart(&mut self) {
        self.state.ended = false;
        self.seek(0.0, false);
        self.play();
    }

    fn resume_sink(&mut self) {
        if self.state.reverse {
            return;
        }
        if let Some(audio) = self.audio.as_mut() {
            audio.sink.resume();
        }
    }

    // =========================================================================
    // Seeking
    // =========================================================================

    /// Moves the playhead to `secs` (or by `secs` when `relative`), clamped to
    /// `[0, duration]`. The frame is decoded lazily.
    pub fn seek(&mut self, secs: f64, relative: bool) {
        let target = if relative {
            self.state.position_secs + secs
        } else {
            secs
        };
        let target = if target.is_nan() {
            self.state.position_secs
        } else {
            target.clamp(0.0, self.duration_secs)
        };
        let index = self.timestamps.table().frame_for_time(target);
        self.jump_to(target, index);
    }

    /// Moves the playhead to frame `frame` (or by `frame` frames when
    /// `relative`), clamped to the valid frame range.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    pub fn seek_frame(&mut self, frame: i64, relative: bool) {
        let last = self.frame_count().saturating_sub(1) as i64;
        let target = if relative {
            (self.state.frame_index as i64).saturating_add(frame)
        } else {
            frame
        };
        let index = target.clamp(0, last) as usize;
        let position = self
            .timestamps
            .table()
            .time_for_frame(index)
            .clamp(0.0, self.duration_secs);
        self.jump_to(position, index);
    }

    fn jump_to(&mut self, position_secs: f64, frame_index: usize) {
        self.state.position_secs = position_secs;
        self.state.frame_index = frame_index;
        self.state.ended = false;
        self.displayed = None;
        self.last_tick = None;
        self.restart_audio();
    }

    // =========================================================================
    // Speed, reverse, looping
    // =========================================================================

    /// Sets the playback speed (clamped). Audio restarts at the current
    /// position with the new tempo.
    pub fn set_speed(&mut self, speed: f64) {
        let speed = PlaybackSpeed::new(speed);
        if speed != self.state.speed {
            self.state.speed = speed;
            self.restart_audio();
        }
    }

    /// Enables or disables reverse playback.
    ///
    /// Enabling decodes every frame into memory first. Audio is silent while
    /// reversed.
    ///
    /// # Errors
    ///
    /// - [`Error::ReverseMemoryExceeded`] if the frames would not fit under
    ///   the configured ceiling; nothing is decoded in that case
    /// - [`Error::VideoStream`] if decoding fails
    pub fn set_reverse(&mut self, reverse: bool) -> Result<()> {
        if reverse == self.state.reverse {
            return Ok(());
        }
        if reverse {
            let frames = match self.preload_all() {
                Ok(frames) => frames,
                Err(e @ Error::ReverseMemoryExceeded { .. }) => return Err(e),
                Err(e) => {
                    self.halt(&e);
                    return Err(e);
                }
            };
            log::debug!("reverse playback buffered {} frames", frames.len());
            self.reverse_frames = Some(frames);
            self.state.reverse = true;
            if let Some(audio) = self.audio.as_mut() {
                audio.sink.clear();
                audio.sink.pause();
            }
        } else {
            self.reverse_frames = None;
            self.state.reverse = false;
            self.restart_audio();
            if self.state.playback.is_playing() {
                self.resume_sink();
            }
        }
        self.displayed = None;
        self.last_tick = None;
        Ok(())
    }

    /// Bytes needed to hold every frame at the current output size.
    #[must_use]
    pub fn reverse_memory_estimate(&self) -> u64 {
        let (width, height) = self.source.output_size();
        let per_frame = u64::from(width)
            * u64::from(height)
            * self.source.colour_format().channels() as u64;
        per_frame.saturating_mul(self.frame_count() as u64)
    }

    fn preload_all(&mut self) -> Result<Vec<VideoFrame>> {
        let required_bytes = self.reverse_memory_estimate();
        let limit_bytes = self.settings.reverse_memory_limit_bytes;
        if required_bytes > limit_bytes {
            return Err(Error::ReverseMemoryExceeded {
                required_bytes,
                limit_bytes,
            });
        }

        self.source.rewind()?;
        self.read_head = Some(0);
        let mut frames = Vec::with_capacity(self.frame_count());
        while let Some(frame) = self.source.next_frame()? {
            frames.push(frame);
        }
        self.read_head = None;
        Ok(frames)
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.state.looping = looping;
    }

    // =========================================================================
    // Volume
    // =========================================================================

    pub fn set_volume(&mut self, volume: f32) {
        self.apply_volume(Volume::new(volume));
    }

    pub fn volume_up(&mut self) {
        self.apply_volume(self.state.volume.increase());
    }

    pub fn volume_down(&mut self) {
        self.apply_volume(self.state.volume.decrease());
    }

    fn apply_volume(&mut self, volume: Volume) {
        self.state.volume = volume;
        if let Some(audio) = self.audio.as_mut() {
            audio.sink.set_volume(volume.value());
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.state.muted = muted;
        if let Some(audio) = self.audio.as_mut() {
            audio.sink.set_muted(muted);
        }
    }

    // =========================================================================
    // Output geometry
    // =========================================================================

    pub fn set_interpolation(&mut self, interp: Interpolation) {
        self.settings.interpolation = interp;
    }

    /// Changes the output size; `None` restores the original size.
    ///
    /// Frames already decoded (the current one and the reverse buffer) are
    /// resampled in-process.
    pub fn resize(&mut self, size: Option<(u32, u32)>) -> Result<()> {
        let interp = self.settings.interpolation;
        self.source.resize(size, interp)?;
        let target = self.source.output_size();

        if let Some(frame) = self.current.as_mut() {
            *frame = resize_frame(frame, target, interp)?;
            self.fresh = true;
        }
        if let Some(frames) = self.reverse_frames.as_mut() {
            for frame in frames.iter_mut() {
                *frame = resize_frame(frame, target, interp)?;
            }
        }
        Ok(())
    }

    /// Releases the frame source and the audio path.
    pub fn close(&mut self) {
        self.state.playback = PlaybackState::Stopped;
        self.state.buffering = false;
        self.disable_audio();
        self.source.close();
        self.reverse_frames = None;
        self.current = None;
        self.displayed = None;
        self.read_head = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaybackConfig;
    use crate::testing::{RecordingFrameSink, ScriptedSource, SourceLogHandle};
    use crate::test_utils::assert_abs_diff_eq;

    fn clock_over(source: ScriptedSource) -> (PlaybackClock, SourceLogHandle) {
        let log = source.log_handle();
        let table = TimestampTable::constant(source.frame_rate(), source.frame_count());
        let clock = PlaybackClock::new(
            Box::new(source),
            None,
            TimestampIndex::fixed(table),
            ClockSettings::from_config(&PlaybackConfig::default()),
        );
        (clock, log)
    }

    /// 5s at 10 fps followed by 5s at 30 fps.
    fn mixed_rate_pts() -> Vec<f64> {
        (0..50)
            .map(|i| f64::from(i) / 10.0)
            .chain((0..150).map(|i| 5.0 + f64::from(i) / 30.0))
            .collect()
    }

    fn ms(start: Instant, millis: u64) -> Instant {
        start + Duration::from_millis(millis)
    }

    #[test]
    fn stopped_clock_does_not_advance() {
        let (mut clock, log) = clock_over(ScriptedSource::new(24, 24.0, (2, 2)));
        let start = Instant::now();
        assert!(!clock.update_at(start).unwrap());
        assert!(!clock.update_at(ms(start, 500)).unwrap());
        assert_eq!(clock.position(), 0.0);
        assert!(log.snapshot().decoded.is_empty());
    }

    #[test]
    fn playing_advances_by_elapsed_time() {
        let (mut clock, _) = clock_over(ScriptedSource::new(240, 24.0, (2, 2)));
        let start = Instant::now();
        clock.play();
        assert!(clock.update_at(start).unwrap());
        assert_eq!(clock.frame().unwrap().index, 0);

        assert!(clock.update_at(ms(start, 500)).unwrap());
        assert_abs_diff_eq!(clock.position(), 0.5, epsilon = 1e-9);
        assert_eq!(clock.frame().unwrap().index, 12);
        assert!(!clock.update_at(ms(start, 510)).unwrap());
    }

    #[test]
    fn speed_scales_advance() {
        let (mut clock, _) = clock_over(ScriptedSource::new(240, 24.0, (2, 2)));
        let start = Instant::now();
        clock.set_speed(2.0);
        clock.play();
        clock.update_at(start).unwrap();
        clock.update_at(ms(start, 250)).unwrap();
        assert_abs_diff_eq!(clock.position(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn paused_clock_holds_position() {
        let (mut clock, _) = clock_over(ScriptedSource::new(240, 24.0, (2, 2)));
        let start = Instant::now();
        clock.play();
        clock.update_at(start).unwrap();
        clock.update_at(ms(start, 100)).unwrap();
        clock.pause();
        assert!(!clock.update_at(ms(start, 900)).unwrap());
        assert_abs_diff_eq!(clock.position(), 0.1, epsilon = 1e-9);

        clock.resume();
        clock.update_at(ms(start, 1000)).unwrap();
        clock.update_at(ms(start, 1100)).unwrap();
        assert_abs_diff_eq!(clock.position(), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn seek_updates_bookkeeping_without_decoding() {
        let (mut clock, log) = clock_over(ScriptedSource::new(240, 24.0, (2, 2)));
        clock.seek(5.0, false);
        assert_abs_diff_eq!(clock.position(), 5.0);
        assert_eq!(clock.state().frame_index, 120);
        assert!(log.snapshot().decoded.is_empty());

        clock.seek(-1.5, true);
        assert_abs_diff_eq!(clock.position(), 3.5);
        clock.seek(-999_999.0, false);
        assert_eq!(clock.position(), 0.0);
        clock.seek(1e9, false);
        assert_abs_diff_eq!(clock.position(), 10.0);
    }

    #[test]
    fn force_frame_materializes_after_seek() {
        let (mut clock, log) = clock_over(ScriptedSource::new(240, 24.0, (2, 2)));
        clock.seek(5.0, false);
        assert!(clock.force_frame().unwrap());
        assert_eq!(clock.frame().unwrap().index, 120);
        assert_eq!(log.snapshot().seeks, vec![120]);
    }

    #[test]
    fn variable_rate_seek_uses_the_tabled_time() {
        let pts = mixed_rate_pts();
        let source = ScriptedSource::new(200, 20.0, (2, 2)).with_timestamps(pts.clone());
        let log = source.log_handle();
        let table = TimestampTable::variable(pts, 20.0).unwrap();
        let mut clock = PlaybackClock::new(
            Box::new(source),
            None,
            TimestampIndex::fixed(table.clone()),
            ClockSettings::from_config(&PlaybackConfig::default()),
        );

        clock.seek(8.0, false);
        assert_eq!(clock.state().frame_index, 140);
        clock.force_frame().unwrap();

        let snapshot = log.snapshot();
        assert_eq!(snapshot.seeks, vec![140]);
        assert_abs_diff_eq!(snapshot.seek_times[0], table.time_for_frame(140), epsilon = 1e-9);
        assert_abs_diff_eq!(snapshot.seek_times[0], 8.0, epsilon = 1e-9);
        let frame = clock.frame().unwrap();
        assert_eq!(frame.index, 140);
        assert_abs_diff_eq!(frame.pts_secs, table.time_for_frame(140), epsilon = 1e-9);
    }

    #[test]
    fn seek_past_end_shows_last_frame() {
        let (mut clock, _) = clock_over(ScriptedSource::new(240, 24.0, (2, 2)));
        clock.seek(1e9, false);
        clock.force_frame().unwrap();
        assert_eq!(clock.frame().unwrap().index, 239);
    }

    #[test]
    fn small_forward_gap_decodes_through() {
        let (mut clock, log) = clock_over(ScriptedSource::new(240, 24.0, (2, 2)));
        clock.seek_frame(0, false);
        clock.force_frame().unwrap();
        clock.seek_frame(10, true);
        clock.force_frame().unwrap();
        let snapshot = log.snapshot();
        assert!(snapshot.seeks.is_empty());
        assert_eq!(snapshot.decoded, (0..=10).collect::<Vec<_>>());
        assert_eq!(clock.frame().unwrap().index, 10);
    }

    #[test]
    fn backward_jump_without_seek_rewinds() {
        let (mut clock, log) = clock_over(ScriptedSource::new(100, 10.0, (2, 2)).sequential_only());
        clock.seek_frame(20, false);
        clock.force_frame().unwrap();
        clock.seek_frame(5, false);
        clock.force_frame().unwrap();
        assert_eq!(clock.frame().unwrap().index, 5);
        let snapshot = log.snapshot();
        assert_eq!(snapshot.rewinds, 1);
        assert!(snapshot.seeks.is_empty());
    }

    #[test]
    fn end_of_stream_stops_and_flags_ended() {
        let (mut clock, _) = clock_over(ScriptedSource::new(10, 10.0, (2, 2)));
        let start = Instant::now();
        clock.play();
        clock.update_at(start).unwrap();
        clock.update_at(ms(start, 2000)).unwrap();
        assert_eq!(clock.state().playback, PlaybackState::Stopped);
        assert!(clock.is_ended());
        assert_eq!(clock.frame().unwrap().index, 9);

        clock.play();
        assert_eq!(clock.position(), 0.0);
        assert!(!clock.is_ended());
    }

    #[test]
    fn looping_restarts_at_zero() {
        let (mut clock, _) = clock_over(ScriptedSource::new(10, 10.0, (2, 2)));
        let start = Instant::now();
        clock.set_looping(true);
        clock.play();
        clock.update_at(start).unwrap();
        clock.update_at(ms(start, 1500)).unwrap();
        assert!(clock.state().playback.is_playing());
        assert_eq!(clock.position(), 0.0);
        assert!(!clock.is_ended());
    }

    #[test]
    fn decode_failure_stops_playback() {
        let (mut clock, _) = clock_over(ScriptedSource::new(100, 10.0, (2, 2)).failing_at(3));
        let start = Instant::now();
        clock.play();
        clock.update_at(start).unwrap();
        let result = clock.update_at(ms(start, 500));
        assert!(matches!(result, Err(Error::VideoStream(_))));
        assert_eq!(clock.state().playback, PlaybackState::Stopped);
    }

    #[test]
    fn reverse_preloads_then_walks_down() {
        let (mut clock, log) = clock_over(ScriptedSource::new(30, 10.0, (2, 2)));
        clock.seek(2.0, false);
        clock.set_reverse(true).unwrap();
        assert_eq!(log.snapshot().decoded.len(), 30);

        let start = Instant::now();
        clock.play();
        clock.update_at(start).unwrap();
        let mut previous = clock.frame().unwrap().index;
        for step in 1..=5 {
            clock.update_at(ms(start, step * 150)).unwrap();
            let index = clock.frame().unwrap().index;
            assert!(index < previous, "{index} should be below {previous}");
            previous = index;
        }
        assert_eq!(log.snapshot().decoded.len(), 30);
    }

    #[test]
    fn reverse_respects_memory_ceiling() {
        let source = ScriptedSource::new(10_000, 30.0, (1920, 1080));
        let log = source.log_handle();
        let (mut clock, _) = clock_over(source);
        clock.settings.reverse_memory_limit_bytes = 1024 * 1024;
        let result = clock.set_reverse(true);
        assert!(matches!(result, Err(Error::ReverseMemoryExceeded { .. })));
        assert!(!clock.state().reverse);
        assert!(log.snapshot().decoded.is_empty());
    }

    #[test]
    fn resize_rescales_decoded_frames() {
        let (mut clock, _) = clock_over(ScriptedSource::new(10, 10.0, (4, 4)));
        clock.force_frame().unwrap();
        clock.resize(Some((2, 2))).unwrap();
        let frame = clock.frame().unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        clock.resize(None).unwrap();
        assert_eq!(clock.frame().unwrap().width, 4);
    }

    #[test]
    fn draw_presents_only_new_frames_unless_forced() {
        let (mut clock, _) = clock_over(ScriptedSource::new(10, 10.0, (2, 2)));
        let mut sink = RecordingFrameSink::default();
        assert!(clock.draw(&mut sink, true).unwrap());
        assert!(!clock.draw(&mut sink, false).unwrap());
        assert!(clock.draw(&mut sink, true).unwrap());
        assert_eq!(sink.indices(), vec![0, 0]);
    }

    #[test]
    fn take_frame_moves_frame_out() {
        let (mut clock, _) = clock_over(ScriptedSource::new(10, 10.0, (2, 2)));
        clock.force_frame().unwrap();
        let frame = clock.take_frame().unwrap();
        assert_eq!(frame.index, 0);
        assert!(clock.frame().is_none());
    }

    #[test]
    fn forced_draw_after_take_frame_presents_again() {
        let (mut clock, _) = clock_over(ScriptedSource::new(10, 10.0, (2, 2)));
        clock.force_frame().unwrap();
        clock.take_frame().unwrap();

        let mut sink = RecordingFrameSink::default();
        assert!(clock.draw(&mut sink, true).unwrap());
        assert_eq!(sink.indices(), vec![0]);
        assert_eq!(clock.frame().unwrap().index, 0);
    }
}
