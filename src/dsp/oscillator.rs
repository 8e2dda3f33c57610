//! Band-limited periodic sources.
//!
//! Saw and square edges are smoothed with a two-sample polynomial step
//! (PolyBLEP); sine and triangle have no hard edges and run naive.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    #[default]
    Sawtooth,
    Triangle,
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    frequency: f64,
    /// Fixed offset in cents.
    detune: f64,
    sample_rate: f64,
    /// Normalized phase in [0, 1).
    phase: f64,
    /// Phase advance per sample, capped at half a cycle.
    step: f64,
}

impl Oscillator {
    pub fn with_frequency(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        let mut osc = Oscillator {
            waveform,
            frequency,
            detune: 0.0,
            sample_rate,
            phase: 0.0,
            step: 0.0,
        };
        osc.retune();
        osc
    }

    /// Same oscillator, offset by `cents`.
    pub fn detuned(mut self, cents: f64) -> Self {
        self.detune = cents;
        self.retune();
        self
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Frequency actually produced, detune included.
    pub fn effective_frequency(&self) -> f64 {
        self.frequency * 2.0_f64.powf(self.detune / 1200.0)
    }

    /// Change pitch without resetting phase.
    pub fn set_frequency(&mut self, frequency: f64) {
        if frequency != self.frequency {
            self.frequency = frequency;
            self.retune();
        }
    }

    fn retune(&mut self) {
        self.step = if self.sample_rate > 0.0 {
            (self.effective_frequency() / self.sample_rate).clamp(0.0, 0.5)
        } else {
            0.0
        };
    }

    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        let (t, dt) = (self.phase, self.step);
        let out = match self.waveform {
            Waveform::Sine => (TAU * t).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (t - 0.5).abs(),
            Waveform::Sawtooth => 2.0 * t - 1.0 - blep(t, dt),
            Waveform::Square => {
                let edge = blep(t, dt) - blep((t + 0.5).fract(), dt);
                if t < 0.5 { 1.0 + edge } else { -1.0 + edge }
            }
        };
        self.phase = (t + dt).fract();
        out
    }
}

/// Correction for a unit downward step at phase 0, spread over the
/// sample either side of it.
#[inline]
fn blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let x = t / dt;
        2.0 * x - x * x - 1.0
    } else if t > 1.0 - dt {
        let x = (t - 1.0) / dt;
        x * x + 2.0 * x + 1.0
    } else {
        0.0
    }
}
