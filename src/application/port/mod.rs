// SPDX-License-Identifier: MPL-2.0
//! Port definitions (traits) for dependency inversion.
//!
//! # Available Ports
//!
//! - [`video`]: Frame sources (decode backends) and frame sinks (renderers)
//! - [`audio`]: Chunk extractors (external decoders) and audio sinks (devices)
//! - [`stream`]: Stream resolution for remote media
//!
//! # Design Notes
//!
//! - Traits exchange plain data only (no FFmpeg, cpal or GUI types)
//! - Methods are synchronous; concurrency is owned by the engine
//! - Backends are selected by capability flags, never by concrete type

pub mod audio;
pub mod stream;
pub mod video;

pub use audio::{AudioChunk, AudioSink, Cancellation, ChunkExtractor, ChunkRequest};
pub use stream::{ResolvedStream, StreamResolver, TrackInfo};
pub use video::{BackendKind, Capabilities, FrameSink, FrameSource};
