//! Procedural reverb impulse responses.
//!
//! An impulse is an exponentially decaying mix of seeded diffusion noise
//! and a fixed table of early reflections. Its length grows from 0.5 s at
//! amount 0 to 3.0 s at amount 100. The noise for sample `i` does not
//! depend on the impulse length, so for a fixed seed a larger amount only
//! ever adds energy.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::config::CacheMode;

/// Impulse length at amount 0, seconds.
pub const MIN_DURATION: f64 = 0.5;
/// Impulse length at amount 100, seconds.
pub const MAX_DURATION: f64 = 3.0;

/// Early reflections: (delay seconds, gain).
const REFLECTIONS: [(f64, f64); 5] = [
    (0.010, 0.6),
    (0.020, 0.45),
    (0.035, 0.35),
    (0.055, 0.25),
    (0.080, 0.15),
];

/// Level of the diffuse noise tail relative to the reflections.
const DIFFUSION: f64 = 0.5;

/// Right-channel width modulation.
const WIDTH_DEPTH: f64 = 0.15;
const WIDTH_RATE_HZ: f64 = 0.5;

/// Decay constant: the envelope falls by about 60 dB over the impulse.
const DECAY: f64 = 6.9;

/// Minimum RMS used when normalizing convolution output.
const MIN_POWER: f64 = 0.000_125;
/// Overall convolution output calibration.
const GAIN_CALIBRATION: f64 = 0.001_25;
const GAIN_CALIBRATION_SAMPLE_RATE: f64 = 44_100.0;

/// Impulse length in seconds for a reverb amount 0–100.
pub fn impulse_duration(amount: f32) -> f64 {
    let norm = (amount as f64).clamp(0.0, 100.0) / 100.0;
    MIN_DURATION + (MAX_DURATION - MIN_DURATION) * norm
}

/// A synthesized stereo impulse response.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: f64,
    pub amount: f32,
}

impl ImpulseResponse {
    pub fn generate(amount: f32, sample_rate: f64, seed: u64) -> Self {
        let duration = impulse_duration(amount);
        let frames = ((duration * sample_rate) as usize).max(1);
        let reflections: Vec<(usize, f64)> = REFLECTIONS
            .iter()
            .map(|&(t, g)| ((t * sample_rate).round() as usize, g))
            .collect();

        let mut rng = StdRng::seed_from_u64(seed);
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for i in 0..frames {
            let t = i as f64 / sample_rate;
            let envelope = (-DECAY * t / duration).exp();
            let early: f64 = reflections
                .iter()
                .filter(|&&(at, _)| at == i)
                .map(|&(_, g)| g)
                .sum();
            let noise_l: f64 = rng.gen_range(-1.0..1.0);
            let noise_r: f64 = rng.gen_range(-1.0..1.0);
            let width = 1.0 + WIDTH_DEPTH * (TAU * WIDTH_RATE_HZ * t).sin();

            left.push((envelope * (noise_l * DIFFUSION + early)) as f32);
            right.push((envelope * (noise_r * DIFFUSION + early) * width) as f32);
        }

        ImpulseResponse {
            left,
            right,
            sample_rate,
            amount,
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.len() as f64 / self.sample_rate
    }

    /// Sum of squared samples over both channels.
    pub fn energy(&self) -> f64 {
        self.left
            .iter()
            .chain(&self.right)
            .map(|&s| s as f64 * s as f64)
            .sum()
    }

    /// Output scale applied after convolving with this impulse, so a
    /// response of any length lands at a similar loudness.
    pub fn normalization(&self) -> f64 {
        let count = (self.left.len() + self.right.len()).max(1) as f64;
        let power = (self.energy() / count).sqrt().max(MIN_POWER);
        GAIN_CALIBRATION / power * GAIN_CALIBRATION_SAMPLE_RATE / self.sample_rate
    }
}

type CacheKey = (u32, u64);

/// Impulse responses keyed by (amount, sample rate).
///
/// In [`CacheMode::Bypass`] every request synthesizes a fresh response.
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct ImpulseCache {
    mode: CacheMode,
    seed: u64,
    entries: Arc<Mutex<HashMap<CacheKey, Arc<ImpulseResponse>>>>,
}

impl ImpulseCache {
    pub fn new(mode: CacheMode, seed: u64) -> Self {
        ImpulseCache {
            mode,
            seed,
            entries: Arc::default(),
        }
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn get(&self, amount: f32, sample_rate: f64) -> Arc<ImpulseResponse> {
        if self.mode == CacheMode::Bypass {
            return Arc::new(ImpulseResponse::generate(amount, sample_rate, self.seed));
        }

        let key = (amount.to_bits(), sample_rate.to_bits());
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ir) = entries.get(&key) {
            trace!(amount, sample_rate, "impulse cache hit");
            return Arc::clone(ir);
        }
        let ir = Arc::new(ImpulseResponse::generate(amount, sample_rate, self.seed));
        entries.insert(key, Arc::clone(&ir));
        ir
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
