// SPDX-License-Identifier: MPL-2.0
//! Stream resolution port.
//!
//! Network protocols are not implemented here. A resolver turns a page or
//! playlist URL into a direct media URL plus the tracks on offer, and the
//! session opens that URL like any other locator.

use crate::error::Result;
use crate::media::MediaLocator;

/// A track offered by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    /// Quality label such as "720p", or a language code for subtitles.
    pub label: String,
}

/// Result of resolving a stream.
#[derive(Debug, Clone)]
pub struct ResolvedStream {
    pub locator: MediaLocator,
    pub title: Option<String>,
    pub qualities: Vec<TrackInfo>,
    pub subtitles: Vec<TrackInfo>,
}

impl ResolvedStream {
    /// A stream with no extra track metadata.
    #[must_use]
    pub fn direct(locator: MediaLocator) -> Self {
        Self {
            locator,
            title: None,
            qualities: Vec::new(),
            subtitles: Vec::new(),
        }
    }
}

/// Resolves a user-facing URL to a direct media locator. Called synchronously
/// before any backend is constructed.
pub trait StreamResolver {
    /// # Errors
    ///
    /// Returns an error if the URL cannot be resolved.
    fn resolve(&self, url: &str) -> Result<ResolvedStream>;
}

impl<F: Fn(&str) -> Result<ResolvedStream>> StreamResolver for F {
    fn resolve(&self, url: &str) -> Result<ResolvedStream> {
        self(url)
    }
}
