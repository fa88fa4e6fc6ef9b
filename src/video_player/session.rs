// SPDX-License-Identifier: MPL-2.0
//! Playback session: the public surface of the engine.
//!
//! A session owns one [`PlaybackClock`] (and through it the frame source and
//! the audio pipeline) plus the tokio runtime whose blocking pool runs audio
//! extraction and timestamp probing. Once [`PlaybackSession::close`] has run,
//! every operation fails with [`Error::Closed`].
//!
//! # Example
//!
//! ```no_run
//! use framepace::config::PlaybackConfig;
//! use framepace::media::MediaLocator;
//! use framepace::video_player::PlaybackSession;
//!
//! let mut session = PlaybackSession::open(MediaLocator::path("clip.mp4"), &PlaybackConfig::default())?;
//! session.play()?;
//! loop {
//!     if session.update()? {
//!         let frame = session.frame()?.expect("a new frame is current");
//!         // hand frame.data to the renderer, honouring frame.colour
//!     }
//!     if session.is_ended()? {
//!         break;
//!     }
//! }
//! session.close();
//! # Ok::<(), framepace::error::Error>(())
//! ```

use super::audio_pipeline::{AudioChunkPipeline, PipelineSettings, PipelineStats};
use super::clock::{ClockAudio, ClockSettings, PlaybackClock};
use super::metadata::SessionMetadata;
use super::state::ClockState;
use super::timestamps::{TimestampIndex, TimestampProbe, TimestampTable};
use crate::application::port::{
    AudioSink, ChunkExtractor, FrameSink, FrameSource, ResolvedStream, StreamResolver,
};
use crate::config::PlaybackConfig;
use crate::error::{Error, Result};
use crate::infrastructure::ffmpeg::probe::probe_frame_times;
use crate::infrastructure::{open_chunk_extractor, open_frame_source, CpalAudioSink};
use crate::media::{Interpolation, MediaLocator, VideoFrame};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;

/// An open media item and everything playing it.
pub struct PlaybackSession {
    clock: PlaybackClock,
    runtime: Option<Runtime>,
    config: PlaybackConfig,
    extractor: Option<Arc<dyn ChunkExtractor>>,
    probe: Option<TimestampProbe>,
    stream: Option<ResolvedStream>,
    closed: bool,
}

impl PlaybackSession {
    /// Opens `locator` with the first backend that accepts it.
    ///
    /// Audio is set up when the media has an audio stream, `no_audio` is off,
    /// and both the extractor and the output device are available; failing
    /// either only disables audio.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedFormat`] if no backend can read the media, or
    ///   `locator` is a capture device
    /// - [`Error::NoBackendAvailable`] if no backend could run at all
    pub fn open(locator: MediaLocator, config: &PlaybackConfig) -> Result<Self> {
        if locator.is_live() {
            return Err(Error::UnsupportedFormat(format!(
                "{locator} is a live device; open it with Webcam"
            )));
        }
        let config = config.validated();
        let source = open_frame_source(&locator, &config)?;

        let wants_audio = !config.no_audio && source.info().audio.is_some();
        let audio = if wants_audio {
            open_audio(&locator, &config)
        } else {
            None
        };

        let probe: Option<TimestampProbe> =
            (config.vfr && locator.supports_input_seek()).then(|| {
                let ffprobe = config.ffprobe_path.clone();
                let locator = locator.clone();
                Arc::new(move || probe_frame_times(&ffprobe, &locator)) as TimestampProbe
            });

        Self::assemble(source, audio, probe, config)
    }

    /// Resolves `url` through `resolver`, then opens the direct locator.
    ///
    /// The resolved title and track lists are kept and reported by
    /// [`Self::metadata`].
    pub fn open_stream(
        resolver: &dyn StreamResolver,
        url: &str,
        config: &PlaybackConfig,
    ) -> Result<Self> {
        let resolved = resolver.resolve(url)?;
        log::debug!("resolved {url} to {}", resolved.locator);
        let mut session = Self::open(resolved.locator.clone(), config)?;
        session.stream = Some(resolved);
        Ok(session)
    }

    /// Builds a session from caller-supplied components.
    ///
    /// Timestamps the source reports at open are used as-is; no probing
    /// happens.
    pub fn with_components(
        source: Box<dyn FrameSource>,
        audio: Option<(Box<dyn ChunkExtractor>, Box<dyn AudioSink>)>,
        config: &PlaybackConfig,
    ) -> Result<Self> {
        let config = config.validated();
        let audio = audio
            .filter(|_| !config.no_audio)
            .map(|(extractor, sink)| (Arc::<dyn ChunkExtractor>::from(extractor), sink));
        Self::assemble(source, audio, None, config)
    }

    fn assemble(
        source: Box<dyn FrameSource>,
        audio: Option<(Arc<dyn ChunkExtractor>, Box<dyn AudioSink>)>,
        probe: Option<TimestampProbe>,
        config: PlaybackConfig,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.max_threads + 1)
            .thread_name("framepace-worker")
            .build()?;

        let info = source.info().clone();
        let constant = TimestampTable::constant(info.frame_rate, info.effective_frame_count());
        let table = info
            .timestamps
            .clone()
            .and_then(|pts| TimestampTable::variable(pts, info.frame_rate))
            .unwrap_or(constant);
        let timestamps = match &probe {
            Some(probe) if !table.is_variable() => {
                TimestampIndex::probing(table, probe, runtime.handle())
            }
            _ => TimestampIndex::fixed(table),
        };

        let mut extractor = None;
        let clock_audio = audio.map(|(chunk_extractor, sink)| {
            let (sample_rate, channels) = sink.output_format();
            let settings = PipelineSettings {
                chunk_size_secs: config.chunk_size_secs,
                max_threads: config.max_threads,
                max_chunks: config.max_chunks,
                sample_rate,
                channels,
                audio_track: config.audio_track,
                media_duration_secs: Some(info.duration_secs),
            };
            let pipeline = AudioChunkPipeline::new(
                Arc::clone(&chunk_extractor),
                settings,
                runtime.handle().clone(),
                0.0,
                config.speed,
            );
            extractor = Some(chunk_extractor);
            ClockAudio { pipeline, sink }
        });

        let mut clock = PlaybackClock::new(
            source,
            clock_audio,
            timestamps,
            ClockSettings::from_config(&config),
        );
        clock.set_speed(config.speed);
        clock.set_volume(config.volume);
        clock.set_looping(config.looping);

        log::debug!(
            "session opened: {} backend, {:.3}s, {} frames, audio {}",
            clock.source().backend().name(),
            clock.duration(),
            clock.frame_count(),
            if clock.has_audio() { "on" } else { "off" }
        );

        Ok(Self {
            clock,
            runtime: Some(runtime),
            config,
            extractor,
            probe,
            stream: None,
            closed: false,
        })
    }

    fn live(&self) -> Result<&PlaybackClock> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(&self.clock)
    }

    fn live_mut(&mut self) -> Result<&mut PlaybackClock> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(&mut self.clock)
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Advances playback; returns true when a new frame is ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VideoStream`] if decoding failed; playback is stopped.
    pub fn update(&mut self) -> Result<bool> {
        self.live_mut()?.update()
    }

    /// [`Self::update`] against a caller-supplied instant.
    pub fn update_at(&mut self, now: Instant) -> Result<bool> {
        self.live_mut()?.update_at(now)
    }

    /// Updates, then presents the current frame to `sink` if it is new or
    /// `force` is set. Returns true when the sink was called.
    pub fn draw(&mut self, sink: &mut dyn FrameSink, force: bool) -> Result<bool> {
        self.live_mut()?.draw(sink, force)
    }

    /// Decodes the frame for the current position without advancing time.
    pub fn force_frame(&mut self) -> Result<bool> {
        self.live_mut()?.force_frame()
    }

    pub fn frame(&self) -> Result<Option<&VideoFrame>> {
        Ok(self.live()?.frame())
    }

    pub fn take_frame(&mut self) -> Result<Option<VideoFrame>> {
        Ok(self.live_mut()?.take_frame())
    }

    // =========================================================================
    // Transport
    // =========================================================================

    pub fn play(&mut self) -> Result<()> {
        self.live_mut()?.play();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.live_mut()?.pause();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.live_mut()?.resume();
        Ok(())
    }

    pub fn toggle_pause(&mut self) -> Result<()> {
        self.live_mut()?.toggle_pause();
        Ok(())
    }

    /// Stops and rewinds to the beginning.
    pub fn stop(&mut self) -> Result<()> {
        self.live_mut()?.stop();
        Ok(())
    }

    /// Seeks to 0 and plays.
    pub fn restart(&mut self) -> Result<()> {
        self.live_mut()?.restart();
        Ok(())
    }

    /// Seeks to `secs` (or by `secs` when `relative`), clamped to the media.
    ///
    /// The new frame appears on the next [`Self::update`] or
    /// [`Self::force_frame`].
    pub fn seek(&mut self, secs: f64, relative: bool) -> Result<()> {
        self.live_mut()?.seek(secs, relative);
        Ok(())
    }

    /// Seeks to frame `frame` (or by `frame` frames when `relative`).
    pub fn seek_frame(&mut self, frame: i64, relative: bool) -> Result<()> {
        self.live_mut()?.seek_frame(frame, relative);
        Ok(())
    }

    pub fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.live_mut()?.set_looping(looping);
        Ok(())
    }

    /// Enables or disables reverse playback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReverseMemoryExceeded`] if pre-decoding every frame
    /// would exceed `reverse_memory_limit_mb`.
    pub fn set_reverse(&mut self, reverse: bool) -> Result<()> {
        self.live_mut()?.set_reverse(reverse)
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        self.live_mut()?.set_speed(speed);
        Ok(())
    }

    pub fn speed(&self) -> Result<f64> {
        Ok(self.live()?.state().speed.value())
    }

    // =========================================================================
    // Volume
    // =========================================================================

    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.live_mut()?.set_volume(volume);
        Ok(())
    }

    pub fn get_volume(&self) -> Result<f32> {
        Ok(self.live()?.state().volume.value())
    }

    pub fn volume_up(&mut self) -> Result<()> {
        self.live_mut()?.volume_up();
        Ok(())
    }

    pub fn volume_down(&mut self) -> Result<()> {
        self.live_mut()?.volume_down();
        Ok(())
    }

    pub fn mute(&mut self) -> Result<()> {
        self.live_mut()?.set_muted(true);
        Ok(())
    }

    pub fn unmute(&mut self) -> Result<()> {
        self.live_mut()?.set_muted(false);
        Ok(())
    }

    pub fn toggle_mute(&mut self) -> Result<()> {
        let clock = self.live_mut()?;
        let muted = clock.state().muted;
        clock.set_muted(!muted);
        Ok(())
    }

    pub fn is_muted(&self) -> Result<bool> {
        Ok(self.live()?.state().muted)
    }

    // =========================================================================
    // Output and tracks
    // =========================================================================

    /// Sets the filter used by subsequent resizes.
    pub fn set_interp(&mut self, interp: Interpolation) -> Result<()> {
        self.live_mut()?.set_interpolation(interp);
        self.config.interpolation = interp;
        Ok(())
    }

    /// Changes the output frame size; `None` restores the original size.
    pub fn resize(&mut self, size: Option<(u32, u32)>) -> Result<()> {
        self.live_mut()?.resize(size)
    }

    /// Switches audio extraction to the `track`-th audio stream.
    ///
    /// The audio pipeline restarts at the current position and, with `vfr`
    /// enabled, the timestamp table is probed again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AudioStream`] if the media has no such track.
    pub fn set_audio_track(&mut self, track: usize) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if let Some(audio) = &self.clock.source().info().audio {
            if track >= audio.track_count.max(1) {
                return Err(Error::AudioStream(format!(
                    "No audio track {track}, media has {}",
                    audio.track_count
                )));
            }
        }
        if track == self.config.audio_track {
            return Ok(());
        }
        self.config.audio_track = track;

        let Some(runtime) = self.runtime.as_ref() else {
            return Err(Error::Closed);
        };
        let settings = self.clock.audio_settings().map(|current| PipelineSettings {
            audio_track: track,
            ..current.clone()
        });
        if let (Some(extractor), Some(settings)) = (self.extractor.as_ref(), settings) {
            let pipeline = AudioChunkPipeline::new(
                Arc::clone(extractor),
                settings,
                runtime.handle().clone(),
                self.clock.position(),
                self.clock.state().speed.value(),
            );
            self.clock.replace_pipeline(pipeline);
        }
        if self.config.vfr {
            if let Some(probe) = &self.probe {
                self.clock.timestamps_mut().rebuild(probe, runtime.handle());
            }
        }
        log::debug!("switched to audio track {track}");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current playback position in seconds.
    pub fn get_pos(&self) -> Result<f64> {
        Ok(self.live()?.position())
    }

    pub fn duration(&self) -> Result<f64> {
        Ok(self.live()?.duration())
    }

    pub fn frame_index(&self) -> Result<usize> {
        Ok(self.live()?.state().frame_index)
    }

    pub fn state(&self) -> Result<&ClockState> {
        Ok(self.live()?.state())
    }

    /// True once playback stopped by reaching the end of the media.
    pub fn is_ended(&self) -> Result<bool> {
        Ok(self.live()?.is_ended())
    }

    /// Counters of the live audio pipeline, if audio is playing.
    pub fn audio_stats(&self) -> Result<Option<PipelineStats>> {
        Ok(self.live()?.audio_stats())
    }

    #[must_use]
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// What the stream resolver reported, for sessions opened from a URL.
    #[must_use]
    pub fn stream(&self) -> Option<&ResolvedStream> {
        self.stream.as_ref()
    }

    pub fn metadata(&self) -> Result<SessionMetadata> {
        let clock = self.live()?;
        let source = clock.source();
        let table = clock.timestamps();
        let audio = source.info().audio.as_ref();
        let labels = |tracks: &[crate::application::port::TrackInfo]| {
            tracks.iter().map(|t| t.label.clone()).collect::<Vec<_>>()
        };
        Ok(SessionMetadata {
            duration_secs: clock.duration(),
            frame_count: clock.frame_count(),
            frame_rate: table.avg_frame_rate(),
            min_frame_rate: table.min_frame_rate(),
            max_frame_rate: table.max_frame_rate(),
            original_size: source.original_size(),
            output_size: source.output_size(),
            colour_format: source.colour_format(),
            backend: source.backend().name(),
            audio_channels: audio.map(|a| a.channels),
            audio_sample_rate: audio.map(|a| a.sample_rate),
            audio_track: self.config.audio_track,
            vfr: table.is_variable(),
            title: self.stream.as_ref().and_then(|s| s.title.clone()),
            qualities: self
                .stream
                .as_ref()
                .map(|s| labels(&s.qualities))
                .unwrap_or_default(),
            subtitles: self
                .stream
                .as_ref()
                .map(|s| labels(&s.subtitles))
                .unwrap_or_default(),
        })
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Stops every worker and releases the decoder. Safe to call repeatedly.
    ///
    /// Workers still running after `shutdown_grace_ms` are abandoned.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.clock.close();
        self.extractor = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(self.config.shutdown_grace());
        }
        log::debug!("session closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_audio(
    locator: &MediaLocator,
    config: &PlaybackConfig,
) -> Option<(Arc<dyn ChunkExtractor>, Box<dyn AudioSink>)> {
    let extractor = match open_chunk_extractor(locator, config) {
        Ok(extractor) => extractor,
        Err(e) => {
            log::warn!("audio disabled: {e}");
            return None;
        }
    };
    match CpalAudioSink::new(config.volume) {
        Ok(sink) => Some((Arc::from(extractor), Box::new(sink))),
        Err(e) => {
            log::warn!("audio disabled: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingAudioSink, ScriptedSource, SyntheticExtractor};

    fn config() -> PlaybackConfig {
        PlaybackConfig {
            chunk_size_secs: 0.5,
            max_threads: 2,
            max_chunks: 2,
            ..PlaybackConfig::default()
        }
    }

    #[test]
    fn closed_session_fails_fast() {
        let source = ScriptedSource::new(24, 24.0, (2, 2));
        let log = source.log_handle();
        let mut session =
            PlaybackSession::with_components(Box::new(source), None, &config()).unwrap();
        session.close();
        session.close();
        assert!(session.is_closed());
        assert!(log.snapshot().closed);
        assert_eq!(session.play(), Err(Error::Closed));
        assert_eq!(session.update(), Err(Error::Closed));
        assert_eq!(session.get_pos(), Err(Error::Closed));
        assert!(matches!(session.metadata(), Err(Error::Closed)));
    }

    #[test]
    fn audio_track_out_of_range_is_rejected() {
        let source = ScriptedSource::new(24, 24.0, (2, 2)).with_audio(2, 100);
        let sink = RecordingAudioSink::new(100, 2);
        let mut session = PlaybackSession::with_components(
            Box::new(source),
            Some((Box::new(SyntheticExtractor::new()), Box::new(sink))),
            &config(),
        )
        .unwrap();
        assert!(matches!(
            session.set_audio_track(3),
            Err(Error::AudioStream(_))
        ));
        session.set_audio_track(0).unwrap();
    }

    #[test]
    fn capture_devices_are_refused() {
        let locator = MediaLocator::device(crate::media::CaptureDevice::camera(0));
        assert!(matches!(
            PlaybackSession::open(locator, &config()),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn reselecting_the_current_track_keeps_the_pipeline() {
        let source = ScriptedSource::new(24, 24.0, (2, 2)).with_audio(2, 100);
        let sink = RecordingAudioSink::new(100, 2);
        let sink_handle = sink.handle();
        let mut session = PlaybackSession::with_components(
            Box::new(source),
            Some((Box::new(SyntheticExtractor::new()), Box::new(sink))),
            &config(),
        )
        .unwrap();
        let clears = sink_handle.snapshot().clears;
        let epoch = session.audio_stats().unwrap().map(|stats| stats.epoch);

        session.set_audio_track(0).unwrap();

        assert_eq!(sink_handle.snapshot().clears, clears);
        assert_eq!(session.audio_stats().unwrap().map(|stats| stats.epoch), epoch);
    }

    #[test]
    fn config_values_seed_the_clock() {
        let config = PlaybackConfig {
            speed: 2.0,
            volume: 0.5,
            looping: true,
            ..config()
        };
        let session = PlaybackSession::with_components(
            Box::new(ScriptedSource::new(24, 24.0, (2, 2))),
            None,
            &config,
        )
        .unwrap();
        let state = session.state().unwrap();
        assert_eq!(state.speed.value(), 2.0);
        assert_eq!(state.volume.value(), 0.5);
        assert!(state.looping);
    }
}
