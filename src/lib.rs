//! Offline mixdown engine.
//!
//! Renders a [`Project`] (tracks of sampled-audio and MIDI regions with
//! per-track mix settings) into one stereo buffer, deterministically for a
//! fixed noise seed. MIDI regions are voiced by a subtractive synth or a
//! set of synthesized drums, routed through clip, track and master effect
//! chains, and summed on the master bus.

pub mod config;
pub mod dsp;
pub mod error;
pub mod export;
pub mod graph;
pub mod project;
pub mod render;
pub mod synth;
pub mod transport;

pub use config::{CacheMode, RenderConfig};
pub use error::{ConfigError, ExportError, FetchError, GraphError, RenderError};
pub use project::{AudioRegion, MidiNote, MidiRegion, Project, Region, TimeSignature, Track, TrackKind};
pub use render::{
    CancelToken, MemoryFetcher, RenderOutput, RenderSession, RenderState, SampleFetcher, SampleLibrary,
    render, render_project,
};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
