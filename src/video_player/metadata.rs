// SPDX-License-Identifier: MPL-2.0
//! Read-only description of an open session, for display and logging.

use crate::media::ColourFormat;
use serde::Serialize;
use std::collections::BTreeMap;

/// Derived properties of the media and of the session playing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMetadata {
    pub duration_secs: f64,
    pub frame_count: usize,
    /// Average frame rate.
    pub frame_rate: f64,
    pub min_frame_rate: f64,
    pub max_frame_rate: f64,
    pub original_size: (u32, u32),
    pub output_size: (u32, u32),
    pub colour_format: ColourFormat,
    pub backend: &'static str,
    /// `None` when the media has no audio stream.
    pub audio_channels: Option<u16>,
    pub audio_sample_rate: Option<u32>,
    pub audio_track: usize,
    pub vfr: bool,
    pub title: Option<String>,
    pub qualities: Vec<String>,
    pub subtitles: Vec<String>,
}

impl SessionMetadata {
    /// Flattens the metadata into a string-keyed map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(fields)) => fields.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }
}
