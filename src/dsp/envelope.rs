//! ADSR envelope generator.
//!
//! Linear attack, exponential decay and release. Exponential ramps never
//! reach zero, so they target [`ENVELOPE_FLOOR`] instead; the envelope goes
//! idle once the release ramp arrives there.

use serde::{Deserialize, Serialize};

/// Target level of exponential ramps that would otherwise head to zero.
pub const ENVELOPE_FLOOR: f64 = 0.001;

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR timing in seconds, sustain as a level in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Adsr {
    pub const fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Adsr {
            attack,
            decay,
            sustain,
            release,
        }
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Adsr::new(0.01, 0.1, 0.7, 0.3)
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub shape: Adsr,

    stage: Stage,
    level: f64,
    sample_rate: f64,
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current ramp.
    start_level: f64,
    /// Level the current ramp heads to.
    target_level: f64,
}

impl Envelope {
    pub fn new(shape: Adsr, sample_rate: f64) -> Self {
        Envelope {
            shape,
            stage: Stage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
            target_level: 0.0,
        }
    }

    /// Trigger the envelope (note on).
    pub fn gate_on(&mut self) {
        self.start_level = self.level;
        self.target_level = 1.0;
        self.enter(Stage::Attack, self.shape.attack);
    }

    /// Release the envelope (note off), ramping from wherever the envelope
    /// currently is so early stops stay click-free.
    pub fn gate_off(&mut self) {
        if matches!(self.stage, Stage::Idle | Stage::Release) {
            return;
        }
        self.start_level = self.level.max(ENVELOPE_FLOOR);
        self.target_level = ENVELOPE_FLOOR;
        self.enter(Stage::Release, self.shape.release);
    }

    /// Current level without advancing.
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Generate the next envelope sample.
    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Sustain => {
                self.level = self.sustain_level();
            }
            Stage::Attack => {
                if self.ramp_done() {
                    self.level = 1.0;
                    self.start_level = 1.0;
                    self.target_level = self.sustain_level();
                    self.enter(Stage::Decay, self.shape.decay);
                } else {
                    let t = self.progress();
                    self.level = self.start_level + (self.target_level - self.start_level) * t;
                    self.stage_counter += 1;
                }
            }
            Stage::Decay => {
                if self.ramp_done() {
                    self.level = self.sustain_level();
                    self.stage = Stage::Sustain;
                } else {
                    self.level = exponential(self.start_level, self.target_level, self.progress());
                    self.stage_counter += 1;
                }
            }
            Stage::Release => {
                if self.ramp_done() {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                } else {
                    self.level = exponential(self.start_level, self.target_level, self.progress());
                    self.stage_counter += 1;
                }
            }
        }
        self.level
    }

    /// Returns true once the release ramp has finished.
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }

    fn sustain_level(&self) -> f64 {
        self.shape.sustain.clamp(0.0, 1.0).max(ENVELOPE_FLOOR)
    }

    fn enter(&mut self, stage: Stage, seconds: f64) {
        self.stage = stage;
        self.stage_samples = (seconds.max(0.0) * self.sample_rate) as usize;
        self.stage_counter = 0;
    }

    fn ramp_done(&self) -> bool {
        self.stage_counter >= self.stage_samples
    }

    fn progress(&self) -> f64 {
        self.stage_counter as f64 / self.stage_samples as f64
    }
}

/// Exponential interpolation `from * (to / from)^t`; both ends must be > 0.
fn exponential(from: f64, to: f64, t: f64) -> f64 {
    from * (to / from).powf(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(attack: f64, decay: f64, sustain: f64, release: f64) -> Envelope {
        Envelope::new(Adsr::new(attack, decay, sustain, release), 44100.0)
    }

    #[test]
    fn starts_idle() {
        let e = Envelope::new(Adsr::default(), 44100.0);
        assert!(e.is_finished());
    }

    #[test]
    fn attack_is_linear_and_reaches_one() {
        let mut e = env(0.01, 0.1, 0.5, 0.1);
        e.gate_on();
        let first = e.next_sample();
        let second = e.next_sample();
        let third = e.next_sample();
        assert!(((third - second) - (second - first)).abs() < 1e-12);

        let mut max_level: f64 = 0.0;
        for _ in 0..500 {
            max_level = max_level.max(e.next_sample());
        }
        assert!((max_level - 1.0).abs() < 1e-9, "got {max_level}");
    }

    #[test]
    fn decay_is_exponential_towards_sustain() {
        let mut e = env(0.0, 0.1, 0.25, 0.1);
        e.gate_on();
        // Halfway through the decay the exponential ramp is at the
        // geometric mean of 1.0 and 0.25.
        for _ in 0..(4410 / 2) {
            e.next_sample();
        }
        let mid = e.next_sample();
        assert!((mid - 0.5).abs() < 0.01, "got {mid}");
    }

    #[test]
    fn sustain_holds() {
        let mut e = env(0.001, 0.001, 0.6, 0.3);
        e.gate_on();
        for _ in 0..500 {
            e.next_sample();
        }
        let s = e.next_sample();
        assert!((s - 0.6).abs() < 1e-9, "Should sustain at 0.6, got {s}");
    }

    #[test]
    fn zero_sustain_holds_at_floor() {
        let mut e = env(0.0, 0.01, 0.0, 0.1);
        e.gate_on();
        for _ in 0..1000 {
            e.next_sample();
        }
        assert_eq!(e.next_sample(), ENVELOPE_FLOOR);
    }

    #[test]
    fn release_from_current_value_is_continuous() {
        let mut e = env(0.1, 0.1, 0.5, 0.05);
        e.gate_on();
        // Stop halfway through the attack.
        let mut last = 0.0;
        for _ in 0..2205 {
            last = e.next_sample();
        }
        e.gate_off();
        let next = e.next_sample();
        assert!((next - last).abs() < 0.01, "jump from {last} to {next}");
        assert!(next <= last);
    }

    #[test]
    fn release_finishes_after_release_time() {
        let mut e = env(0.001, 0.001, 0.7, 0.01);
        e.gate_on();
        for _ in 0..500 {
            e.next_sample();
        }
        e.gate_off();
        for _ in 0..441 {
            let s = e.next_sample();
            assert!(s >= ENVELOPE_FLOOR * 0.999 && s <= 0.7 + 1e-9);
        }
        e.next_sample();
        assert!(e.is_finished());
        assert_eq!(e.next_sample(), 0.0);
    }

    #[test]
    fn full_cycle_range() {
        let mut e = env(0.01, 0.05, 0.5, 0.1);
        e.gate_on();
        for _ in 0..10000 {
            let s = e.next_sample();
            assert!((0.0..=1.0).contains(&s), "Envelope out of range: {s}");
        }
        e.gate_off();
        for _ in 0..10000 {
            let s = e.next_sample();
            assert!((0.0..=1.0).contains(&s));
        }
        assert!(e.is_finished());
    }
}
