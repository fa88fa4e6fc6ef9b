// SPDX-License-Identifier: MPL-2.0
//! Playback configuration, loaded from and saved to a `playback.toml` file.
//!
//! # Path Resolution
//!
//! 1. Use `load_from_path()`/`save_to_path()` with an explicit path
//! 2. Set the `FRAMEPACE_CONFIG_DIR` environment variable
//! 3. Falls back to the platform-specific config directory
//!
//! # Examples
//!
//! ```no_run
//! use framepace::config::{self, PlaybackConfig};
//!
//! let mut config = config::load();
//! config.max_threads = 2;
//! config::save(&config).expect("Failed to save config");
//! ```

pub mod defaults;

pub use defaults::*;

use crate::application::port::BackendKind;
use crate::error::{Error, Result};
use crate::media::Interpolation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "playback.toml";
const APP_NAME: &str = "framepace";

/// Environment variable to override the config directory.
pub const ENV_CONFIG_DIR: &str = "FRAMEPACE_CONFIG_DIR";

/// Tunables for one playback session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Duration of one extracted audio chunk, in seconds.
    pub chunk_size_secs: f64,
    /// Number of concurrent audio extraction workers.
    pub max_threads: usize,
    /// Completed-but-unconsumed audio chunks held at most.
    pub max_chunks: usize,
    /// Probe per-frame timestamps instead of assuming a constant rate.
    pub vfr: bool,
    /// Skip audio entirely.
    pub no_audio: bool,
    pub speed: f64,
    pub volume: f32,
    /// Restart at zero on end-of-stream instead of stopping.
    pub looping: bool,
    pub interpolation: Interpolation,
    /// Index among the media's audio streams used for extraction.
    pub audio_track: usize,
    pub reverse_memory_limit_mb: u64,
    pub audio_wait_ms: u64,
    pub audio_lead_secs: f64,
    pub max_sequential_gap: usize,
    pub shutdown_grace_ms: u64,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Backends tried in order when opening media.
    pub backends: Vec<BackendKind>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_size_secs: DEFAULT_CHUNK_SIZE_SECS,
            max_threads: DEFAULT_MAX_THREADS,
            max_chunks: DEFAULT_MAX_CHUNKS,
            vfr: false,
            no_audio: false,
            speed: DEFAULT_PLAYBACK_SPEED,
            volume: DEFAULT_VOLUME,
            looping: false,
            interpolation: Interpolation::default(),
            audio_track: 0,
            reverse_memory_limit_mb: DEFAULT_REVERSE_MEMORY_LIMIT_MB,
            audio_wait_ms: DEFAULT_AUDIO_WAIT_MS,
            audio_lead_secs: DEFAULT_AUDIO_LEAD_SECS,
            max_sequential_gap: DEFAULT_MAX_SEQUENTIAL_GAP,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            ffmpeg_path: DEFAULT_FFMPEG_PATH.to_string(),
            ffprobe_path: DEFAULT_FFPROBE_PATH.to_string(),
            backends: BackendKind::preference_order().to_vec(),
        }
    }
}

impl PlaybackConfig {
    /// Returns a copy with every numeric field clamped into its valid range.
    #[must_use]
    pub fn validated(&self) -> Self {
        let mut config = self.clone();
        config.chunk_size_secs = sanitize(
            config.chunk_size_secs,
            DEFAULT_CHUNK_SIZE_SECS,
            MIN_CHUNK_SIZE_SECS,
            MAX_CHUNK_SIZE_SECS,
        );
        config.max_threads = config.max_threads.clamp(MIN_MAX_THREADS, MAX_MAX_THREADS);
        config.max_chunks = config.max_chunks.clamp(MIN_MAX_CHUNKS, MAX_MAX_CHUNKS);
        config.speed = sanitize(
            config.speed,
            DEFAULT_PLAYBACK_SPEED,
            MIN_PLAYBACK_SPEED,
            MAX_PLAYBACK_SPEED,
        );
        config.volume = if config.volume.is_finite() {
            config.volume.clamp(MIN_VOLUME, MAX_VOLUME)
        } else {
            DEFAULT_VOLUME
        };
        config.reverse_memory_limit_mb = config
            .reverse_memory_limit_mb
            .clamp(MIN_REVERSE_MEMORY_LIMIT_MB, MAX_REVERSE_MEMORY_LIMIT_MB);
        config.audio_wait_ms = config.audio_wait_ms.min(MAX_AUDIO_WAIT_MS);
        config.audio_lead_secs = sanitize(
            config.audio_lead_secs,
            DEFAULT_AUDIO_LEAD_SECS,
            MIN_AUDIO_LEAD_SECS,
            MAX_AUDIO_LEAD_SECS,
        );
        config.max_sequential_gap = config
            .max_sequential_gap
            .clamp(MIN_MAX_SEQUENTIAL_GAP, MAX_MAX_SEQUENTIAL_GAP);
        config.shutdown_grace_ms = config.shutdown_grace_ms.min(MAX_SHUTDOWN_GRACE_MS);
        if config.backends.is_empty() {
            config.backends = BackendKind::preference_order().to_vec();
        }
        config
    }

    /// Ceiling for reverse pre-decode, in bytes.
    #[must_use]
    pub fn reverse_memory_limit_bytes(&self) -> u64 {
        self.reverse_memory_limit_mb.saturating_mul(1024 * 1024)
    }

    #[must_use]
    pub fn audio_wait(&self) -> Duration {
        Duration::from_millis(self.audio_wait_ms)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn sanitize(value: f64, default: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        default
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir).join(CONFIG_FILE));
        }
    }
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

/// Loads the configuration from the default path.
///
/// Missing or unreadable files yield the default configuration.
pub fn load() -> PlaybackConfig {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            match load_from_path(&path) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Ignoring config at {}: {e}", path.display());
                }
            }
        }
    }
    PlaybackConfig::default()
}

/// Saves the configuration to the default path.
pub fn save(config: &PlaybackConfig) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

/// Loads configuration from a specific path.
///
/// Invalid TOML falls back to the default configuration.
pub fn load_from_path(path: &Path) -> Result<PlaybackConfig> {
    let content = fs::read_to_string(path)?;
    match toml::from_str::<PlaybackConfig>(&content) {
        Ok(config) => Ok(config.validated()),
        Err(e) => {
            log::warn!("Invalid config {}: {e}", path.display());
            Ok(PlaybackConfig::default())
        }
    }
}

/// Saves configuration to a specific path, creating parent directories.
pub fn save_to_path(config: &PlaybackConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config).map_err(Error::from)?;
    fs::write(path, content)?;
    Ok(())
}
