//! Project timeline model.
//!
//! These types map directly to the project JSON handed over by the editor.
//! They are consumed read-only by the renderer.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::NodeSpec;
use crate::synth::SynthParams;
use crate::transport::pos_to_time;

// ── Timeline ────────────────────────────────────────────────

/// A complete project: tempo, meter and tracks.
///
/// Duration is always derived from the regions, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Beats per minute. Must be > 0.
    pub tempo: f64,
    #[serde(default)]
    pub time_signature: TimeSignature,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl Project {
    pub fn new(tempo: f64, time_signature: TimeSignature) -> Self {
        Project {
            tempo,
            time_signature,
            tracks: Vec::new(),
        }
    }

    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Convert a musical position on this project's timeline to seconds.
    pub fn time_at(&self, pos: f64) -> f64 {
        pos_to_time(pos, self.tempo, self.time_signature.numerator)
    }

    /// Latest region end across all tracks, in beats.
    pub fn end_position(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.regions.iter())
            .map(Region::end)
            .fold(0.0, f64::max)
    }

    /// Total duration in seconds. Zero for a non-positive tempo.
    pub fn duration_seconds(&self) -> f64 {
        if self.tempo <= 0.0 {
            return 0.0;
        }
        self.time_at(self.end_position())
    }

    /// Tracks that should be heard, honouring mute and solo.
    pub fn audible_tracks(&self) -> impl Iterator<Item = &Track> {
        let any_solo = self.tracks.iter().any(|t| t.solo);
        self.tracks
            .iter()
            .filter(move |t| !t.mute && (!any_solo || t.solo))
    }
}

// ── Tracks ──────────────────────────────────────────────────

/// Which engine processes a track's MIDI regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    #[default]
    Audio,
    Microphone,
    Instrument,
    Drums,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub index: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    /// 0–100.
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// −100 (left) to 100 (right).
    #[serde(default)]
    pub pan: f32,
    /// Reverb amount 0–100.
    #[serde(default)]
    pub reverb: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub kind: TrackKind,
    /// Voice settings for instrument tracks.
    #[serde(default)]
    pub synth: SynthParams,
    /// Insert effects, applied before volume, pan and reverb.
    #[serde(default)]
    pub effects: Vec<NodeSpec>,
    #[serde(default)]
    pub regions: Vec<Region>,
}

fn default_volume() -> f32 {
    80.0
}

impl Track {
    pub fn new(index: usize, kind: TrackKind) -> Self {
        Track {
            index,
            name: String::new(),
            color: None,
            volume: default_volume(),
            pan: 0.0,
            reverb: 0.0,
            mute: false,
            solo: false,
            kind,
            synth: SynthParams::default(),
            effects: Vec::new(),
            regions: Vec::new(),
        }
    }
}

// ── Regions ─────────────────────────────────────────────────

/// A time-bounded placement on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Region {
    Audio(AudioRegion),
    Midi(MidiRegion),
}

impl Region {
    /// Start position in beats.
    pub fn start(&self) -> f64 {
        match self {
            Region::Audio(r) => r.start,
            Region::Midi(r) => r.start,
        }
    }

    /// Length in beats.
    pub fn length(&self) -> f64 {
        match self {
            Region::Audio(r) => r.length,
            Region::Midi(r) => r.length,
        }
    }

    pub fn end(&self) -> f64 {
        self.start() + self.length().max(0.0)
    }
}

/// A placed sample file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioRegion {
    pub file_id: String,
    /// Timeline position in beats.
    pub start: f64,
    /// Length in beats.
    pub length: f64,
    /// Seconds skipped at the head of the sample.
    #[serde(default)]
    pub trim_start: f64,
    /// Linear gain applied to the region.
    #[serde(default = "unity")]
    pub gain: f32,
    /// Fade-in length in seconds.
    #[serde(default)]
    pub fade_in: f64,
    /// Fade-out length in seconds, ending at the region end.
    #[serde(default)]
    pub fade_out: f64,
}

fn unity() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiRegion {
    /// Timeline position in beats.
    pub start: f64,
    /// Length in beats.
    pub length: f64,
    #[serde(default)]
    pub notes: Vec<MidiNote>,
}

/// One note event. Times are in beats, relative to the region start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MidiNote {
    pub pitch: u8,
    pub start: f64,
    pub duration: f64,
    pub velocity: u8,
}
