// SPDX-License-Identifier: MPL-2.0
//! Centralized default values for all configuration constants.
//!
//! This module serves as the single source of truth for default values
//! and bounds used across the engine. Constants are organized by category.
//!
//! # Categories
//!
//! - **Audio pipeline**: Chunk duration, worker count, queue capacity
//! - **Playback**: Speed and volume bounds
//! - **Synchronization**: Audio lead and consumer wait budget
//! - **Reverse**: Memory ceiling for full pre-decode
//! - **Lifecycle**: Worker shutdown grace period
//! - **Live capture**: Webcam poll rate

// ==========================================================================
// Audio Pipeline Defaults
// ==========================================================================

/// Default duration of one audio chunk in seconds.
pub const DEFAULT_CHUNK_SIZE_SECS: f64 = 10.0;

/// Minimum chunk duration in seconds.
pub const MIN_CHUNK_SIZE_SECS: f64 = 0.5;

/// Maximum chunk duration in seconds.
pub const MAX_CHUNK_SIZE_SECS: f64 = 60.0;

/// Default number of concurrent extraction workers.
pub const DEFAULT_MAX_THREADS: usize = 1;

/// Minimum number of extraction workers.
pub const MIN_MAX_THREADS: usize = 1;

/// Maximum number of extraction workers.
pub const MAX_MAX_THREADS: usize = 16;

/// Default capacity of the completed-chunk queue.
pub const DEFAULT_MAX_CHUNKS: usize = 1;

/// Minimum completed-chunk capacity.
pub const MIN_MAX_CHUNKS: usize = 1;

/// Maximum completed-chunk capacity.
pub const MAX_MAX_CHUNKS: usize = 64;

/// Sample rate requested from the extractor when no output device dictates one.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Channel count requested from the extractor when no output device dictates one.
pub const DEFAULT_CHANNELS: u16 = 2;

// ==========================================================================
// Playback Defaults
// ==========================================================================

/// Default playback speed (1.0 = normal).
pub const DEFAULT_PLAYBACK_SPEED: f64 = 1.0;

/// Minimum playback speed.
pub const MIN_PLAYBACK_SPEED: f64 = 0.25;

/// Maximum playback speed.
pub const MAX_PLAYBACK_SPEED: f64 = 10.0;

/// Lower bound of a single ffmpeg `atempo` stage.
pub const ATEMPO_MIN: f64 = 0.5;

/// Upper bound of a single ffmpeg `atempo` stage.
pub const ATEMPO_MAX: f64 = 2.0;

/// Default playback volume (0.0 to 1.0).
pub const DEFAULT_VOLUME: f32 = 1.0;

/// Minimum volume level.
pub const MIN_VOLUME: f32 = 0.0;

/// Maximum volume level.
pub const MAX_VOLUME: f32 = 1.0;

/// Volume adjustment step.
pub const VOLUME_STEP: f32 = 0.05;

// ==========================================================================
// Synchronization Defaults
// ==========================================================================

/// Seconds of audio kept queued in the sink ahead of the playhead.
pub const DEFAULT_AUDIO_LEAD_SECS: f64 = 0.25;

/// Minimum audio lead.
pub const MIN_AUDIO_LEAD_SECS: f64 = 0.05;

/// Maximum audio lead.
pub const MAX_AUDIO_LEAD_SECS: f64 = 5.0;

/// Longest time `update()` blocks waiting for a missing audio chunk.
pub const DEFAULT_AUDIO_WAIT_MS: u64 = 5;

/// Upper bound for the audio wait budget.
pub const MAX_AUDIO_WAIT_MS: u64 = 500;

/// Forward gap (in frames) still served by sequential decoding when the
/// backend could seek instead.
pub const DEFAULT_MAX_SEQUENTIAL_GAP: usize = 48;

/// Minimum sequential gap.
pub const MIN_MAX_SEQUENTIAL_GAP: usize = 1;

/// Maximum sequential gap.
pub const MAX_MAX_SEQUENTIAL_GAP: usize = 10_000;

/// Frame rate assumed when a container reports none.
pub const FALLBACK_FRAME_RATE: f64 = 30.0;

// ==========================================================================
// Reverse Playback Defaults
// ==========================================================================

/// Default memory ceiling for reverse pre-decode, in megabytes.
pub const DEFAULT_REVERSE_MEMORY_LIMIT_MB: u64 = 2048;

/// Minimum reverse memory ceiling.
pub const MIN_REVERSE_MEMORY_LIMIT_MB: u64 = 16;

/// Maximum reverse memory ceiling.
pub const MAX_REVERSE_MEMORY_LIMIT_MB: u64 = 65_536;

// ==========================================================================
// Lifecycle Defaults
// ==========================================================================

/// Time `close()` waits for in-flight workers before abandoning them.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 1000;

/// Upper bound for the shutdown grace period.
pub const MAX_SHUTDOWN_GRACE_MS: u64 = 30_000;

/// Default external decoder binary.
pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";

/// Default external prober binary.
pub const DEFAULT_FFPROBE_PATH: &str = "ffprobe";

// ==========================================================================
// Live Capture Defaults
// ==========================================================================

/// Default webcam poll rate in frames per second.
pub const DEFAULT_WEBCAM_FPS: u32 = 30;

/// Minimum webcam poll rate.
pub const MIN_WEBCAM_FPS: u32 = 1;

/// Maximum webcam poll rate.
pub const MAX_WEBCAM_FPS: u32 = 240;
