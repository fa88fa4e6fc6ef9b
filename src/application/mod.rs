// SPDX-License-Identifier: MPL-2.0
//! Application layer - the seams between the playback engine and its
//! backends and collaborators.
//!
//! - [`port`]: Trait definitions (interfaces) for dependency inversion
//!
//! # Dependency Rule
//!
//! - The clock and audio pipeline depend only on these ports; the session
//!   facade wires in the default adapters
//! - Infrastructure adapters (`infrastructure`) implement them
//! - Collaborators (renderers, audio devices, stream resolvers) plug in here

pub mod port;
