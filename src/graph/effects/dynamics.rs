//! Feed-forward dynamics compression, shared by the compressor and the
//! limiter.
//!
//! Gain computer and peak envelope follower match the behaviour of a
//! WebAudio DynamicsCompressorNode closely enough for mixdown use.

use crate::dsp::buffer::StereoBuffer;
use crate::dsp::{db_to_linear, linear_to_db};

#[derive(Debug, Clone)]
pub struct Dynamics {
    /// Threshold in dB.
    pub threshold: f64,
    /// Knee width in dB, 0 for a hard knee.
    pub knee: f64,
    pub ratio: f64,

    attack_coef: f64,
    release_coef: f64,
    envelope: f64,
}

impl Dynamics {
    pub fn new(
        sample_rate: f64,
        threshold: f64,
        knee: f64,
        ratio: f64,
        attack: f64,
        release: f64,
    ) -> Self {
        Dynamics {
            threshold: threshold.clamp(-100.0, 0.0),
            knee: knee.clamp(0.0, 40.0),
            ratio: ratio.clamp(1.0, 20.0),
            attack_coef: coefficient(attack.clamp(0.0001, 1.0), sample_rate),
            release_coef: coefficient(release.clamp(0.001, 5.0), sample_rate),
            envelope: 0.0,
        }
    }

    /// Brick-wall style settings: hard knee, 20:1, near-instant attack.
    pub fn limiter(sample_rate: f64, threshold: f64) -> Self {
        Dynamics::new(sample_rate, threshold, 0.0, 20.0, 0.0005, 0.05)
    }

    /// Gain change in dB for an input level in dB (zero or negative).
    fn compute_gain(&self, input_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio;
        if self.knee <= 0.0 {
            if input_db <= self.threshold {
                0.0
            } else {
                (self.threshold - input_db) * slope
            }
        } else {
            let half_knee = self.knee / 2.0;
            let knee_start = self.threshold - half_knee;
            let knee_end = self.threshold + half_knee;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (self.threshold - input_db) * slope
            } else {
                let x = (input_db - knee_start) / self.knee;
                -x * x * slope * half_knee
            }
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let level = left.abs().max(right.abs()) as f64;
        let coef = if level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;

        let gain = db_to_linear(self.compute_gain(linear_to_db(self.envelope))) as f32;
        (left * gain, right * gain)
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for (l, r) in buffer.left.iter_mut().zip(buffer.right.iter_mut()) {
            (*l, *r) = self.process_frame(*l, *r);
        }
    }

    /// Current gain reduction in dB.
    pub fn gain_reduction(&self) -> f64 {
        -self.compute_gain(linear_to_db(self.envelope))
    }
}

fn coefficient(seconds: f64, sample_rate: f64) -> f64 {
    (-1.0 / (seconds * sample_rate)).exp()
}
