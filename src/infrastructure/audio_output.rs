// SPDX-License-Identifier: MPL-2.0
//! Audio output using cpal for low-latency playback.
//!
//! Implements [`AudioSink`] on the system's default output device, with
//! real-time volume, mute and pause control through atomics shared with the
//! device callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::application::port::{AudioChunk, AudioSink};
use crate::error::{Error, Result};

/// Shared state between audio thread and control thread.
struct SharedState {
    /// Current volume (stored as u32 bits of f32 for atomic access).
    volume_bits: AtomicU32,
    muted: AtomicBool,
    paused: AtomicBool,
}

impl SharedState {
    fn new(initial_volume: f32) -> Self {
        Self {
            volume_bits: AtomicU32::new(initial_volume.to_bits()),
            muted: AtomicBool::new(false),
            paused: AtomicBool::new(true),
        }
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }
}

/// Scales a sample by the perceptual (quadratic) volume curve.
///
/// Clamped to slightly below 1.0 so integer conversions cannot overflow.
fn apply_volume(sample: f32, volume: f32) -> f32 {
    (sample * volume * volume).clamp(-1.0, 0.999_999_9)
}

/// Audio sink on the default output device.
///
/// Starts paused; the session resumes it when playback begins.
pub struct CpalAudioSink {
    shared_state: Arc<SharedState>,
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    channels: u16,
    /// The audio stream (kept alive to maintain playback).
    _stream: cpal::Stream,
}

impl CpalAudioSink {
    /// Opens the default output device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if no output device is found, its
    /// configuration cannot be read, or the stream fails to start.
    pub fn new(initial_volume: f32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("No audio output device found".to_string()))?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::Device(format!("Failed to get audio config: {e}")))?;

        let sample_rate = supported_config.sample_rate();
        let channels = supported_config.channels();

        let shared_state = Arc::new(SharedState::new(initial_volume));
        let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));

        let stream = match supported_config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &supported_config.into(),
                Arc::clone(&buffer),
                Arc::clone(&shared_state),
            )?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &supported_config.into(),
                Arc::clone(&buffer),
                Arc::clone(&shared_state),
            )?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &supported_config.into(),
                Arc::clone(&buffer),
                Arc::clone(&shared_state),
            )?,
            _ => return Err(Error::Device("Unsupported audio sample format".to_string())),
        };

        stream
            .play()
            .map_err(|e| Error::Device(format!("Failed to start audio stream: {e}")))?;

        log::debug!("audio output opened: {sample_rate} Hz, {channels} channels");

        Ok(Self {
            shared_state,
            buffer,
            sample_rate,
            channels,
            _stream: stream,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        buffer: Arc<Mutex<Vec<f32>>>,
        shared_state: Arc<SharedState>,
    ) -> Result<cpal::Stream> {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let silence = T::from_sample(0.0f32);

                    // Paused output holds the buffer in place.
                    if shared_state.is_paused() {
                        data.fill(silence);
                        return;
                    }

                    let Ok(mut buf) = buffer.lock() else {
                        data.fill(silence);
                        return;
                    };

                    // Muted output still consumes so the audio clock keeps moving.
                    let muted = shared_state.is_muted();
                    let volume = shared_state.volume();
                    for (i, sample) in data.iter_mut().enumerate() {
                        *sample = match buf.get(i) {
                            Some(&s) if !muted => T::from_sample(apply_volume(s, volume)),
                            _ => silence,
                        };
                    }

                    let consumed = data.len().min(buf.len());
                    buf.drain(..consumed);
                },
                |err| {
                    log::error!("Audio output error: {err}");
                },
                None,
            )
            .map_err(|e| Error::Device(format!("Failed to build audio stream: {e}")))
    }

    fn lock_buffer(&self) -> Option<std::sync::MutexGuard<'_, Vec<f32>>> {
        self.buffer.lock().ok()
    }

    #[must_use]
    pub fn volume(&self) -> f32 {
        self.shared_state.volume()
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.shared_state.is_muted()
    }
}

impl AudioSink for CpalAudioSink {
    fn push(&mut self, chunk: AudioChunk) -> Result<()> {
        if (chunk.sample_rate, chunk.channels) != (self.sample_rate, self.channels) {
            log::warn!(
                "chunk {} is {} Hz x{}, device expects {} Hz x{}",
                chunk.index,
                chunk.sample_rate,
                chunk.channels,
                self.sample_rate,
                self.channels
            );
        }
        let mut buf = self
            .lock_buffer()
            .ok_or_else(|| Error::Device("Audio buffer poisoned".to_string()))?;
        buf.extend_from_slice(&chunk.samples);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn queued_secs(&self) -> f64 {
        let samples_per_sec = f64::from(self.sample_rate) * f64::from(self.channels.max(1));
        self.lock_buffer()
            .map_or(0.0, |buf| buf.len() as f64 / samples_per_sec)
    }

    fn pause(&mut self) {
        self.shared_state.set_paused(true);
    }

    fn resume(&mut self) {
        self.shared_state.set_paused(false);
    }

    fn clear(&mut self) {
        if let Some(mut buf) = self.lock_buffer() {
            buf.clear();
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.shared_state.set_volume(volume);
    }

    fn set_muted(&mut self, muted: bool) {
        self.shared_state.set_muted(muted);
    }

    fn output_format(&self) -> (u32, u16) {
        (self.sample_rate, self.channels)
    }
}
