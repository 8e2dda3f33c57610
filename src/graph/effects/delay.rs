//! Delay-line effects: feedback echo and flanger.

use std::f64::consts::TAU;

use crate::dsp::buffer::StereoBuffer;
use crate::dsp::filter::{BiquadFilter, FilterType};

/// Longest echo a delay node accepts, seconds.
pub const MAX_DELAY_SECONDS: f64 = 5.0;

/// Stereo echo with a low-pass filter inside the feedback loop.
#[derive(Debug, Clone)]
pub struct Delay {
    line_l: Vec<f32>,
    line_r: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
    damping_l: BiquadFilter,
    damping_r: BiquadFilter,

    /// Feedback amount, 0 to 0.99.
    pub feedback: f32,
    /// Dry/wet mix, 0 (dry) to 1 (wet).
    pub mix: f32,
}

impl Delay {
    pub fn new(sample_rate: f64, time: f64, feedback: f64, mix: f64, filter_frequency: f64) -> Self {
        let delay_samples = ((time.clamp(0.0, MAX_DELAY_SECONDS) * sample_rate) as usize).max(1);
        let damping = BiquadFilter::with_params(
            FilterType::Lowpass,
            sample_rate,
            filter_frequency,
            0.707,
            0.0,
        );
        Delay {
            line_l: vec![0.0; delay_samples + 1],
            line_r: vec![0.0; delay_samples + 1],
            write_pos: 0,
            delay_samples,
            damping_l: damping.clone(),
            damping_r: damping,
            feedback: feedback.clamp(0.0, 0.99) as f32,
            mix: mix.clamp(0.0, 1.0) as f32,
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let len = self.line_l.len();
        let read_pos = (self.write_pos + len - self.delay_samples) % len;

        let delayed_l = self.line_l[read_pos];
        let delayed_r = self.line_r[read_pos];

        let fb_l = self.damping_l.process(delayed_l as f64) as f32 * self.feedback;
        let fb_r = self.damping_r.process(delayed_r as f64) as f32 * self.feedback;
        self.line_l[self.write_pos] = left + fb_l;
        self.line_r[self.write_pos] = right + fb_r;
        self.write_pos = (self.write_pos + 1) % len;

        (
            left * (1.0 - self.mix) + delayed_l * self.mix,
            right * (1.0 - self.mix) + delayed_r * self.mix,
        )
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for (l, r) in buffer.left.iter_mut().zip(buffer.right.iter_mut()) {
            (*l, *r) = self.process_frame(*l, *r);
        }
    }
}

/// Flanger: a short delay swept by a sine LFO, with feedback.
#[derive(Debug, Clone)]
pub struct Flanger {
    line_l: Vec<f32>,
    line_r: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,
    phase: f64,

    /// LFO rate, Hz.
    pub rate: f64,
    /// Sweep depth, seconds.
    pub depth: f64,
    /// Centre delay, seconds.
    pub delay: f64,
    pub feedback: f32,
    pub mix: f32,
}

impl Flanger {
    pub fn new(sample_rate: f64, rate: f64, depth: f64, delay: f64, feedback: f64, mix: f64) -> Self {
        let delay = delay.clamp(0.0, 0.05);
        let depth = depth.clamp(0.0, 0.02);
        let size = ((delay + depth) * sample_rate) as usize + 3;
        Flanger {
            line_l: vec![0.0; size],
            line_r: vec![0.0; size],
            write_pos: 0,
            sample_rate,
            phase: 0.0,
            rate: rate.clamp(0.0, 20.0),
            depth,
            delay,
            feedback: feedback.clamp(-0.95, 0.95) as f32,
            mix: mix.clamp(0.0, 1.0) as f32,
        }
    }

    /// Read `delay_samples` behind the write head with linear interpolation.
    #[inline]
    fn read_interpolated(line: &[f32], write_pos: usize, delay_samples: f64) -> f32 {
        let len = line.len();
        let whole = delay_samples as usize;
        let frac = (delay_samples - whole as f64) as f32;
        let p0 = (write_pos + len - whole) % len;
        let p1 = (p0 + len - 1) % len;
        line[p0] + frac * (line[p1] - line[p0])
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let len = self.line_l.len();
        let lfo = (TAU * self.phase).sin();
        let delay = ((self.delay + self.depth * lfo) * self.sample_rate).clamp(1.0, (len - 2) as f64);

        let wet_l = Self::read_interpolated(&self.line_l, self.write_pos, delay);
        let wet_r = Self::read_interpolated(&self.line_r, self.write_pos, delay);

        self.line_l[self.write_pos] = left + wet_l * self.feedback;
        self.line_r[self.write_pos] = right + wet_r * self.feedback;
        self.write_pos = (self.write_pos + 1) % len;
        self.phase = (self.phase + self.rate / self.sample_rate) % 1.0;

        (
            left * (1.0 - self.mix) + wet_l * self.mix,
            right * (1.0 - self.mix) + wet_r * self.mix,
        )
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for (l, r) in buffer.left.iter_mut().zip(buffer.right.iter_mut()) {
            (*l, *r) = self.process_frame(*l, *r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(n: usize) -> StereoBuffer {
        let mut b = StereoBuffer::new(n);
        b.left[0] = 1.0;
        b.right[0] = 1.0;
        b
    }

    #[test]
    fn dry_mix_is_passthrough() {
        let mut d = Delay::new(44100.0, 0.5, 0.0, 0.0, 5000.0);
        let mut b = StereoBuffer::from_channels(vec![0.5, 0.25], vec![-0.5, 0.1]);
        let before = b.clone();
        d.process(&mut b);
        assert_eq!(b, before);
    }

    #[test]
    fn echo_arrives_after_delay_time() {
        let mut d = Delay::new(1000.0, 0.01, 0.0, 1.0, 400.0);
        let mut b = impulse(30);
        d.process(&mut b);
        assert!(b.left[..10].iter().all(|s| s.abs() < 1e-6));
        assert!((b.left[10] - 1.0).abs() < 1e-6);
        assert!((b.right[10] - 1.0).abs() < 1e-6);
        assert!(b.left[20].abs() < 1e-6, "no feedback, no second echo");
    }

    #[test]
    fn feedback_echoes_decay() {
        let mut d = Delay::new(1000.0, 0.01, 0.5, 1.0, 450.0);
        let mut b = impulse(60);
        d.process(&mut b);
        let energy = |from: usize| b.left[from..from + 10].iter().map(|s| s * s).sum::<f32>();
        let (first, second, third) = (energy(10), energy(20), energy(30));
        assert!(second > 0.0);
        assert!(first > second && second > third);
    }

    #[test]
    fn flanger_dry_is_passthrough() {
        let mut f = Flanger::new(44100.0, 0.5, 0.002, 0.005, 0.5, 0.0);
        let mut b = StereoBuffer::from_channels(vec![0.5; 64], vec![-0.5; 64]);
        f.process(&mut b);
        assert!(b.left.iter().all(|s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn flanger_sweeps_delay() {
        let sr = 48000.0;
        let mut f = Flanger::new(sr, 5.0, 0.002, 0.004, 0.0, 1.0);
        // Track where a train of impulses re-emerges as the LFO moves.
        let mut b = StereoBuffer::new(9600);
        for i in (0..9600).step_by(1200) {
            b.left[i] = 1.0;
        }
        f.process(&mut b);
        let arrival = |start: usize| {
            (start..start + 1200)
                .max_by(|&a, &c| b.left[a].abs().total_cmp(&b.left[c].abs()))
                .map(|i| i - start)
                .unwrap_or(0)
        };
        let lags: Vec<usize> = (0..8).map(|k| arrival(k * 1200)).collect();
        let min = lags.iter().min().copied().unwrap_or(0);
        let max = lags.iter().max().copied().unwrap_or(0);
        assert!(max - min > 20, "lags should move with the LFO: {lags:?}");
        assert!(lags.iter().all(|&l| l <= 290));
    }
}
