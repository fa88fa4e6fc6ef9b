// SPDX-License-Identifier: MPL-2.0
//! Bounded audio chunk extraction pipeline.
//!
//! Chunk `k` covers source time `[base + k * chunk_size, base + (k + 1) * chunk_size)`,
//! capped at the media duration. Each requested chunk becomes one blocking job
//! on the session runtime; a job reserves an extraction slot, runs the
//! extractor (an external decoder process) and deposits the decoded samples in
//! a completion map keyed by index.
//!
//! # Backpressure
//!
//! A job may only start extracting when all of the following hold:
//! - it is the lowest index not yet started (slots are handed out in order)
//! - fewer than `max_threads` extractions are running
//! - completed-but-unconsumed chunks plus running extractions stay below `max_chunks`
//!
//! Otherwise the job thread waits on a condition variable until the consumer
//! frees a slot. [`AudioChunkPipeline::request_chunk`] itself never blocks.
//!
//! # Epochs
//!
//! [`AudioChunkPipeline::restart`] bumps the epoch. Jobs of an older epoch stop
//! waiting, their extractors observe cancellation, and whatever they return is
//! dropped on arrival, so the consumer only ever sees chunks of the current
//! epoch.

use crate::application::port::{AudioChunk, Cancellation, ChunkExtractor, ChunkRequest};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Fixed parameters of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub chunk_size_secs: f64,
    pub max_threads: usize,
    pub max_chunks: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub audio_track: usize,
    /// Media duration; `None` when unknown (live or unprobed streams).
    pub media_duration_secs: Option<f64>,
}

impl PipelineSettings {
    fn normalized(mut self) -> Self {
        self.max_threads = self.max_threads.max(1);
        self.max_chunks = self.max_chunks.max(1);
        if !(self.chunk_size_secs.is_finite() && self.chunk_size_secs > 0.0) {
            self.chunk_size_secs = crate::config::DEFAULT_CHUNK_SIZE_SECS;
        }
        self.media_duration_secs = self
            .media_duration_secs
            .filter(|d| d.is_finite() && *d > 0.0);
        self
    }
}

/// Result of polling the consumer side.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkPoll {
    /// The next chunk in index order.
    Ready(AudioChunk),
    /// The next chunk is still being extracted.
    Pending,
    /// Every chunk up to the end of the media has been consumed.
    Exhausted,
    /// Extraction failed twice; the pipeline produces no more audio.
    Failed(Error),
}

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    pub epoch: u64,
    /// Completed chunks waiting for the consumer.
    pub buffered: usize,
    /// Extractions currently running.
    pub in_flight: usize,
    /// Highest `buffered` value observed in the current epoch.
    pub peak_buffered: usize,
    /// Next index the consumer will take.
    pub next_index: usize,
}

#[derive(Debug)]
struct PipelineState {
    epoch: u64,
    base_secs: f64,
    speed: f64,
    ready: BTreeMap<usize, AudioChunk>,
    reserved: usize,
    next_reserve: usize,
    next_consume: usize,
    /// One past the highest index handed to the runtime.
    requested: usize,
    /// First index that decoded to nothing: the real end of the audio.
    end_index: Option<usize>,
    failed: Option<Error>,
    closed: bool,
    peak_buffered: usize,
}

struct Shared {
    state: Mutex<PipelineState>,
    slot_freed: Condvar,
    chunk_ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_all(&self) {
        self.slot_freed.notify_all();
        self.chunk_ready.notify_all();
    }
}

struct EpochProbe<'a> {
    shared: &'a Shared,
    epoch: u64,
}

impl Cancellation for EpochProbe<'_> {
    fn is_cancelled(&self) -> bool {
        let state = self.shared.lock();
        state.closed || state.epoch != self.epoch
    }
}

/// Producer/consumer pipeline of decoded audio chunks.
pub struct AudioChunkPipeline {
    shared: Arc<Shared>,
    extractor: Arc<dyn ChunkExtractor>,
    runtime: tokio::runtime::Handle,
    settings: Arc<PipelineSettings>,
}

impl AudioChunkPipeline {
    /// Creates a pipeline at epoch 0 starting at `start_secs`. No work is
    /// scheduled until chunks are requested.
    #[must_use]
    pub fn new(
        extractor: Arc<dyn ChunkExtractor>,
        settings: PipelineSettings,
        runtime: tokio::runtime::Handle,
        start_secs: f64,
        speed: f64,
    ) -> Self {
        let state = PipelineState {
            epoch: 0,
            base_secs: start_secs.max(0.0),
            speed,
            ready: BTreeMap::new(),
            reserved: 0,
            next_reserve: 0,
            next_consume: 0,
            requested: 0,
            end_index: None,
            failed: None,
            closed: false,
            peak_buffered: 0,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                slot_freed: Condvar::new(),
                chunk_ready: Condvar::new(),
            }),
            extractor,
            runtime,
            settings: Arc::new(settings.normalized()),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Number of chunks between the epoch's base offset and the end of the media.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn chunk_limit(settings: &PipelineSettings, state: &PipelineState) -> usize {
        let by_duration = match settings.media_duration_secs {
            Some(duration) => {
                let remaining = (duration - state.base_secs).max(0.0);
                (remaining / settings.chunk_size_secs - 1e-9).ceil().max(0.0) as usize
            }
            None => usize::MAX,
        };
        state.end_index.map_or(by_duration, |end| end.min(by_duration))
    }

    /// Schedules extraction of every chunk up to and including `index` that is
    /// not already scheduled in the current epoch. Never blocks.
    pub fn request_chunk(&self, index: usize) {
        let mut state = self.shared.lock();
        self.schedule_through(&mut state, index);
    }

    /// Keeps enough work scheduled ahead of the consumer to saturate the
    /// worker pool and the completion buffer.
    pub fn fill_window(&self) {
        let mut state = self.shared.lock();
        let window = self.settings.max_chunks + self.settings.max_threads;
        let last = state.next_consume.saturating_add(window).saturating_sub(1);
        self.schedule_through(&mut state, last);
    }

    fn schedule_through(&self, state: &mut PipelineState, index: usize) {
        if state.closed || state.failed.is_some() {
            return;
        }
        let limit = Self::chunk_limit(&self.settings, state);
        let last = index.min(limit.saturating_sub(1));
        if limit == 0 {
            return;
        }
        while state.requested <= last {
            let job_index = state.requested;
            state.requested += 1;
            let shared = Arc::clone(&self.shared);
            let extractor = Arc::clone(&self.extractor);
            let settings = Arc::clone(&self.settings);
            let epoch = state.epoch;
            self.runtime.spawn_blocking(move || {
                run_job(&shared, extractor.as_ref(), &settings, job_index, epoch);
            });
        }
    }

    /// Takes the next chunk in index order, waiting up to `timeout` for it.
    ///
    /// A zero timeout polls without blocking.
    pub fn take_next(&self, timeout: Duration) -> ChunkPoll {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if state.closed {
                return ChunkPoll::Exhausted;
            }
            if let Some(error) = &state.failed {
                return ChunkPoll::Failed(error.clone());
            }
            let index = state.next_consume;
            if let Some(chunk) = state.ready.remove(&index) {
                state.next_consume += 1;
                self.shared.slot_freed.notify_all();
                return ChunkPoll::Ready(chunk);
            }
            if index >= Self::chunk_limit(&self.settings, &state) {
                return ChunkPoll::Exhausted;
            }
            if state.requested <= index {
                self.schedule_through(&mut state, index);
            }
            let now = Instant::now();
            if now >= deadline {
                return ChunkPoll::Pending;
            }
            state = self
                .shared
                .chunk_ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Discards all buffered and in-flight work and starts a new epoch at
    /// `start_secs`. Returns the new epoch.
    pub fn restart(&self, start_secs: f64, speed: f64) -> u64 {
        let mut state = self.shared.lock();
        state.epoch += 1;
        state.base_secs = match self.settings.media_duration_secs {
            Some(duration) => start_secs.clamp(0.0, duration),
            None => start_secs.max(0.0),
        };
        state.speed = speed;
        state.ready.clear();
        state.reserved = 0;
        state.next_reserve = 0;
        state.next_consume = 0;
        state.requested = 0;
        state.end_index = None;
        state.failed = None;
        state.peak_buffered = 0;
        log::debug!(
            "audio pipeline restarted: epoch {} at {:.3}s, speed {:.2}",
            state.epoch,
            state.base_secs,
            speed
        );
        self.shared.notify_all();
        state.epoch
    }

    /// Signals every job to stop. Idempotent.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.ready.clear();
        self.shared.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    #[must_use]
    pub fn buffered_count(&self) -> usize {
        self.shared.lock().ready.len()
    }

    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        let state = self.shared.lock();
        PipelineStats {
            epoch: state.epoch,
            buffered: state.ready.len(),
            in_flight: state.reserved,
            peak_buffered: state.peak_buffered,
            next_index: state.next_consume,
        }
    }
}

impl Drop for AudioChunkPipeline {
    fn drop(&mut self) {
        self.close();
    }
}

#[allow(clippy::cast_precision_loss)]
fn chunk_request(
    settings: &PipelineSettings,
    state: &PipelineState,
    index: usize,
    epoch: u64,
) -> ChunkRequest {
    let start_secs = state.base_secs + index as f64 * settings.chunk_size_secs;
    let duration_secs = match settings.media_duration_secs {
        Some(duration) => settings.chunk_size_secs.min(duration - start_secs).max(0.0),
        None => settings.chunk_size_secs,
    };
    ChunkRequest {
        index,
        epoch,
        start_secs,
        duration_secs,
        speed: state.speed,
        sample_rate: settings.sample_rate,
        channels: settings.channels,
        audio_track: settings.audio_track,
        attempt: 0,
    }
}

fn run_job(
    shared: &Shared,
    extractor: &dyn ChunkExtractor,
    settings: &PipelineSettings,
    index: usize,
    epoch: u64,
) {
    let request = {
        let mut state = shared.lock();
        loop {
            if state.closed || state.epoch != epoch || state.failed.is_some() {
                return;
            }
            let in_order = state.next_reserve == index;
            let thread_free = state.reserved < settings.max_threads;
            let buffer_free = state.ready.len() + state.reserved < settings.max_chunks;
            if in_order && thread_free && buffer_free {
                break;
            }
            state = shared
                .slot_freed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.reserved += 1;
        state.next_reserve += 1;
        shared.slot_freed.notify_all();
        chunk_request(settings, &state, index, epoch)
    };

    let probe = EpochProbe { shared, epoch };
    let result = extract_with_retry(extractor, settings, &request, &probe);

    let mut state = shared.lock();
    if state.closed || state.epoch != epoch {
        log::debug!("dropping chunk {index} of stale epoch {epoch}");
        return;
    }
    state.reserved = state.reserved.saturating_sub(1);
    match result {
        Ok(samples) if samples.is_empty() => {
            state.end_index = Some(state.end_index.map_or(index, |end| end.min(index)));
        }
        Ok(samples) => {
            state.ready.insert(
                index,
                AudioChunk {
                    index,
                    epoch,
                    start_secs: request.start_secs,
                    duration_secs: request.duration_secs,
                    samples,
                    channels: request.channels,
                    sample_rate: request.sample_rate,
                },
            );
            state.peak_buffered = state.peak_buffered.max(state.ready.len());
        }
        Err(e) => {
            log::error!("audio chunk {index} failed after retry: {e}");
            if state.failed.is_none() {
                state.failed = Some(e);
            }
        }
    }
    shared.notify_all();
}

fn extract_with_retry(
    extractor: &dyn ChunkExtractor,
    settings: &PipelineSettings,
    request: &ChunkRequest,
    probe: &EpochProbe<'_>,
) -> Result<Vec<f32>> {
    match extractor.extract(request, probe) {
        Err(e) if !probe.is_cancelled() => {
            log::warn!(
                "audio chunk {} at {:.3}s failed, retrying aligned: {e}",
                request.index,
                request.start_secs
            );
            let media_duration = settings.media_duration_secs.unwrap_or(f64::INFINITY);
            extractor.extract(&request.aligned(media_duration), probe)
        }
        other => other,
    }
}
