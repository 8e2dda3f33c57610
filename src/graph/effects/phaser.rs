//! All-pass phaser with one shared LFO.

use std::f64::consts::TAU;

use crate::dsp::buffer::StereoBuffer;
use crate::dsp::filter::{BiquadFilter, FilterType};
use crate::graph::node::PhaserParams;

/// Samples between all-pass frequency updates.
const CONTROL_INTERVAL: usize = 32;

/// Most all-pass stages a phaser accepts.
pub const MAX_STAGES: u32 = 24;

#[derive(Debug, Clone)]
pub struct Phaser {
    stages_l: Vec<BiquadFilter>,
    stages_r: Vec<BiquadFilter>,
    sample_rate: f64,
    phase: f64,
    counter: usize,
    last_l: f64,
    last_r: f64,

    pub rate: f64,
    pub depth: f64,
    pub frequency: f64,
    pub feedback: f64,
    pub mix: f64,
}

impl Phaser {
    pub fn new(sample_rate: f64, params: &PhaserParams) -> Self {
        let frequency = params.frequency as f64;
        let stage = BiquadFilter::with_params(
            FilterType::Allpass,
            sample_rate,
            frequency,
            params.q as f64,
            0.0,
        );
        let n = params.stages.clamp(1, MAX_STAGES) as usize;
        Phaser {
            stages_l: vec![stage.clone(); n],
            stages_r: vec![stage; n],
            sample_rate,
            phase: 0.0,
            counter: 0,
            last_l: 0.0,
            last_r: 0.0,
            rate: (params.rate as f64).max(0.0),
            depth: (params.depth as f64).max(0.0),
            frequency,
            feedback: (params.feedback as f64).clamp(-0.95, 0.95),
            mix: (params.mix as f64).clamp(0.0, 1.0),
        }
    }

    pub fn stage_count(&self) -> usize {
        self.stages_l.len()
    }

    /// Swept centre frequency for the current LFO phase.
    fn swept_frequency(&self) -> f64 {
        let f = self.frequency + self.depth * (TAU * self.phase).sin();
        f.clamp(20.0, self.sample_rate * 0.45)
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for (l, r) in buffer.left.iter_mut().zip(buffer.right.iter_mut()) {
            if self.counter % CONTROL_INTERVAL == 0 {
                let f = self.swept_frequency();
                for stage in self.stages_l.iter_mut().chain(self.stages_r.iter_mut()) {
                    stage.set_frequency(f);
                }
            }
            self.counter += 1;
            self.phase = (self.phase + self.rate / self.sample_rate) % 1.0;

            let mut wet_l = *l as f64 + self.last_l * self.feedback;
            let mut wet_r = *r as f64 + self.last_r * self.feedback;
            for stage in &mut self.stages_l {
                wet_l = stage.process(wet_l);
            }
            for stage in &mut self.stages_r {
                wet_r = stage.process(wet_r);
            }
            self.last_l = wet_l;
            self.last_r = wet_r;

            *l = (*l as f64 * (1.0 - self.mix) + wet_l * self.mix) as f32;
            *r = (*r as f64 * (1.0 - self.mix) + wet_r * self.mix) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, n: usize, sr: f64) -> StereoBuffer {
        let s: Vec<f32> = (0..n).map(|i| (TAU * freq * i as f64 / sr).sin() as f32).collect();
        StereoBuffer::from_channels(s.clone(), s)
    }

    fn params(stages: u32, rate: f32, depth: f32, feedback: f32, mix: f32) -> PhaserParams {
        PhaserParams {
            stages,
            rate,
            depth,
            feedback,
            mix,
            ..PhaserParams::default()
        }
    }

    #[test]
    fn dry_mix_is_passthrough() {
        let mut p = Phaser::new(48000.0, &params(4, 0.5, 800.0, 0.3, 0.0));
        let mut b = sine(440.0, 256, 48000.0);
        let before = b.clone();
        p.process(&mut b);
        for (x, y) in b.left.iter().zip(&before.left) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn half_mix_notches_the_centre_frequency() {
        let sr = 48000.0;
        // No sweep: one second-order all-pass is 180 degrees out at its
        // centre, so an even mix cancels it.
        let mut p = Phaser::new(sr, &params(1, 0.0, 0.0, 0.0, 0.5));
        let mut b = sine(1000.0, 24000, sr);
        p.process(&mut b);
        let peak = b.left[12000..].iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak < 0.05, "centre frequency should cancel, peak {peak}");
    }

    #[test]
    fn stays_bounded_with_feedback() {
        let mut p = Phaser::new(44100.0, &params(8, 2.0, 900.0, 0.7, 1.0));
        let mut b = sine(300.0, 44100, 44100.0);
        p.process(&mut b);
        assert!(b.left.iter().all(|s| s.is_finite() && s.abs() < 20.0));
        assert_eq!(p.stage_count(), 8);
    }
}
