//! Waveshaping distortion family.
//!
//! Each kind is a transfer curve sampled at [`CURVE_SAMPLES`] points over
//! `x` in [-1, 1]; the [`Waveshaper`] looks input up in the table with
//! linear interpolation, clamping anything outside [-1, 1] to the ends.

use std::f64::consts::PI;

use crate::dsp::buffer::StereoBuffer;
use crate::graph::node::ShaperParams;

pub const CURVE_SAMPLES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    Distortion,
    Overdrive,
    Fuzz,
    SoftClip,
    HardClip,
    Saturation,
}

/// Input value of curve point `i`.
#[inline]
fn curve_x(i: usize) -> f64 {
    i as f64 * 2.0 / (CURVE_SAMPLES - 1) as f64 - 1.0
}

/// Build the transfer table for `kind`.
pub fn make_curve(kind: CurveKind, params: &ShaperParams) -> Vec<f32> {
    let amount = (params.amount as f64).clamp(0.0, 100.0);
    let threshold = (params.threshold as f64).clamp(0.0, 1.0);
    let blend = (params.blend as f64).clamp(0.0, 1.0);

    let shape: Box<dyn Fn(f64) -> f64> = match kind {
        CurveKind::Distortion => {
            let k = amount;
            let deg = PI / 180.0;
            Box::new(move |x| (3.0 + k) * x * 20.0 * deg / (PI + k * x.abs()))
        }
        CurveKind::Overdrive => {
            let k = 1.0 + amount / 10.0;
            Box::new(move |x| (k * x).tanh() / k.tanh())
        }
        CurveKind::Fuzz => {
            let k = 1.0 + amount / 5.0;
            Box::new(move |x| (k * x).clamp(-1.0, 1.0))
        }
        CurveKind::SoftClip => {
            let t = threshold.max(0.01);
            Box::new(move |x| soft_clip(x, t))
        }
        CurveKind::HardClip => Box::new(move |x| x.clamp(-threshold, threshold)),
        CurveKind::Saturation => {
            let k = 1.0 + amount / 20.0;
            Box::new(move |x| {
                let odd = (k * x).tanh() / k.tanh();
                let even = (k * x * x).tanh() / k.tanh();
                (1.0 - blend) * odd + blend * even
            })
        }
    };

    (0..CURVE_SAMPLES).map(|i| shape(curve_x(i)) as f32).collect()
}

/// Linear below `t`, then a cosine-smoothed knee that keeps the slope
/// continuous at the threshold.
fn soft_clip(x: f64, t: f64) -> f64 {
    let a = x.abs();
    if a <= t || t >= 1.0 {
        return x;
    }
    let u = (a - t) / (1.0 - t);
    let y = t + (1.0 - t) * (u - (1.0 - (PI * u).cos()) / PI);
    y.copysign(x)
}

/// Table-lookup waveshaper applied to both channels.
#[derive(Debug, Clone)]
pub struct Waveshaper {
    curve: Vec<f32>,
}

impl Waveshaper {
    pub fn new(curve: Vec<f32>) -> Self {
        Waveshaper { curve }
    }

    pub fn curve(&self) -> &[f32] {
        &self.curve
    }

    #[inline]
    fn shape(&self, x: f32) -> f32 {
        let n = self.curve.len();
        if n == 0 {
            return x;
        }
        if n == 1 {
            return self.curve[0];
        }
        let pos = (x.clamp(-1.0, 1.0) + 1.0) * 0.5 * (n - 1) as f32;
        let i = (pos as usize).min(n - 2);
        let frac = pos - i as f32;
        self.curve[i] + frac * (self.curve[i + 1] - self.curve[i])
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for s in buffer.left.iter_mut().chain(buffer.right.iter_mut()) {
            *s = self.shape(*s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(amount: f32, threshold: f32) -> ShaperParams {
        ShaperParams {
            amount,
            threshold,
            ..ShaperParams::default()
        }
    }

    #[test]
    fn hard_clip_is_clamp() {
        let curve = make_curve(CurveKind::HardClip, &params(50.0, 0.5));
        assert_eq!(curve.len(), CURVE_SAMPLES);
        for (i, &y) in curve.iter().enumerate() {
            let x = curve_x(i);
            assert!((y as f64 - x.clamp(-0.5, 0.5)).abs() < 1e-6, "x={x} y={y}");
        }
    }

    #[test]
    fn curves_are_odd_monotonic_and_bounded() {
        for kind in [
            CurveKind::Distortion,
            CurveKind::Overdrive,
            CurveKind::Fuzz,
            CurveKind::SoftClip,
            CurveKind::HardClip,
        ] {
            let curve = make_curve(kind, &params(60.0, 0.6));
            for w in curve.windows(2) {
                assert!(w[1] >= w[0] - 1e-6, "{kind:?} not monotonic");
            }
            for i in 0..CURVE_SAMPLES / 2 {
                let (a, b) = (curve[i], curve[CURVE_SAMPLES - 1 - i]);
                assert!((a + b).abs() < 1e-5, "{kind:?} not odd");
            }
            assert!(curve.iter().all(|y| y.abs() <= 1.0 + 1e-6), "{kind:?} exceeds 1");
        }
    }

    #[test]
    fn overdrive_endpoints_are_unity() {
        let curve = make_curve(CurveKind::Overdrive, &params(30.0, 0.7));
        assert!((curve[CURVE_SAMPLES - 1] - 1.0).abs() < 1e-6);
        assert!((curve[0] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn soft_clip_is_transparent_below_threshold() {
        let curve = make_curve(CurveKind::SoftClip, &params(0.0, 0.5));
        for (i, &y) in curve.iter().enumerate() {
            let x = curve_x(i);
            if x.abs() <= 0.5 {
                assert!((y as f64 - x).abs() < 1e-6);
            } else {
                assert!((y as f64).abs() < x.abs());
            }
        }
    }

    #[test]
    fn saturation_blend_adds_even_component() {
        let pure = make_curve(CurveKind::Saturation, &ShaperParams { blend: 0.0, ..params(40.0, 0.7) });
        let mixed = make_curve(CurveKind::Saturation, &ShaperParams { blend: 0.5, ..params(40.0, 0.7) });
        let asym = |c: &[f32]| (c[0] + c[CURVE_SAMPLES - 1]).abs();
        assert!(asym(&pure) < 1e-5);
        assert!(asym(&mixed) > 0.1);
    }

    #[test]
    fn shaper_interpolates_and_clamps() {
        let mut ws = Waveshaper::new(vec![-1.0, 0.0, 1.0]);
        let mut b = StereoBuffer::from_channels(vec![0.5, 2.0], vec![-0.25, -3.0]);
        ws.process(&mut b);
        assert!((b.left[0] - 0.5).abs() < 1e-6);
        assert_eq!(b.left[1], 1.0);
        assert!((b.right[0] + 0.25).abs() < 1e-6);
        assert_eq!(b.right[1], -1.0);
    }
}
