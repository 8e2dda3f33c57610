//! Render configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RenderError};
use crate::graph::NodeSpec;

/// Default output sample rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default seed for every pseudorandom buffer created during a render.
pub const DEFAULT_NOISE_SEED: u64 = 0x6D69_7864_6F77_6E21;

/// How reverb impulse responses are reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Always synthesize a fresh impulse response (offline rendering).
    #[default]
    Bypass,
    /// Reuse impulse responses keyed by (amount, sample rate) for the
    /// lifetime of the session.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderConfig {
    pub sample_rate: u32,
    /// Output channel count. Only stereo is supported.
    pub channels: u16,
    pub noise_seed: u64,
    /// Length of the shared percussion noise buffer, in seconds.
    pub noise_buffer_seconds: f64,
    /// Extra time rendered after the last region ends.
    pub tail_seconds: f64,
    pub parallel_tracks: bool,
    pub impulse_cache: CacheMode,
    pub master_volume: f32,
    pub master_effects: Vec<NodeSpec>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 2,
            noise_seed: DEFAULT_NOISE_SEED,
            noise_buffer_seconds: 1.0,
            tail_seconds: 0.0,
            parallel_tracks: true,
            impulse_cache: CacheMode::Bypass,
            master_volume: 1.0,
            master_effects: Vec::new(),
        }
    }
}

impl RenderConfig {
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.sample_rate == 0 {
            return Err(RenderError::InvalidConfig("sample rate must be > 0".into()));
        }
        if self.channels != 2 {
            return Err(RenderError::InvalidConfig(format!(
                "only stereo output is supported, got {} channels",
                self.channels
            )));
        }
        if !(self.noise_buffer_seconds > 0.0) {
            return Err(RenderError::InvalidConfig(
                "noise buffer length must be > 0".into(),
            ));
        }
        Ok(())
    }
}
