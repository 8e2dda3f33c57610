//! Convolution reverb mix stage.
//!
//! Dry and wet paths are summed through two gains, `dry = 1 - 0.7 a` and
//! `wet = 0.3 a` for `a = amount / 100`, so the dry signal never vanishes.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{FftError, RealFftPlanner};
use tracing::warn;

use crate::dsp::buffer::StereoBuffer;
use crate::graph::impulse::{ImpulseCache, ImpulseResponse};

/// Linear convolution of `signal` with `kernel`, truncated to the signal
/// length, using FFT overlap-add.
pub fn convolve(
    signal: &[f32],
    kernel: &[f32],
    planner: &mut RealFftPlanner<f32>,
) -> Result<Vec<f32>, FftError> {
    let n = signal.len();
    let m = kernel.len();
    let mut out = vec![0.0_f32; n];
    if n == 0 || m == 0 {
        return Ok(out);
    }

    // Block length chosen so one block convolved with the whole kernel
    // fits in a single transform.
    let fft_size = (2 * m).next_power_of_two();
    let block = fft_size - m + 1;
    let r2c = planner.plan_fft_forward(fft_size);
    let c2r = planner.plan_fft_inverse(fft_size);

    let mut kernel_time = r2c.make_input_vec();
    kernel_time[..m].copy_from_slice(kernel);
    let mut kernel_spectrum = r2c.make_output_vec();
    r2c.process(&mut kernel_time, &mut kernel_spectrum)?;

    let mut time = r2c.make_input_vec();
    let mut spectrum: Vec<Complex<f32>> = r2c.make_output_vec();
    let mut result = c2r.make_output_vec();
    let scale = 1.0 / fft_size as f32;

    for start in (0..n).step_by(block) {
        let end = (start + block).min(n);
        let chunk = &signal[start..end];
        if chunk.iter().all(|&s| s == 0.0) {
            continue;
        }
        time.fill(0.0);
        time[..chunk.len()].copy_from_slice(chunk);
        r2c.process(&mut time, &mut spectrum)?;
        for (s, k) in spectrum.iter_mut().zip(&kernel_spectrum) {
            *s *= *k;
        }
        c2r.process(&mut spectrum, &mut result)?;
        for (dst, &v) in out[start..].iter_mut().zip(&result) {
            *dst += v * scale;
        }
    }
    Ok(out)
}

/// Reverb send as a dry/wet pair around a convolver.
#[derive(Debug, Clone)]
pub struct ReverbMix {
    amount: f32,
    dry: f32,
    wet: f32,
    impulse: Option<Arc<ImpulseResponse>>,
    impulses: ImpulseCache,
    sample_rate: f64,
}

impl ReverbMix {
    pub fn new(amount: f32, sample_rate: f64, impulses: ImpulseCache) -> Self {
        let mut mix = ReverbMix {
            amount: 0.0,
            dry: 1.0,
            wet: 0.0,
            impulse: None,
            impulses,
            sample_rate,
        };
        mix.set_amount(amount);
        mix
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    pub fn dry_gain(&self) -> f32 {
        self.dry
    }

    pub fn wet_gain(&self) -> f32 {
        self.wet
    }

    pub fn impulse(&self) -> Option<&ImpulseResponse> {
        self.impulse.as_deref()
    }

    /// Change the send level. An amount of 0 drops the impulse and leaves
    /// a dry-only stage.
    pub fn set_amount(&mut self, amount: f32) {
        let amount = if amount.is_finite() {
            amount.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let a = amount / 100.0;
        self.amount = amount;
        self.dry = 1.0 - 0.7 * a;
        self.wet = 0.3 * a;
        self.impulse = if amount > 0.0 {
            Some(self.impulses.get(amount, self.sample_rate))
        } else {
            None
        };
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let Some(ir) = self.impulse.as_ref().filter(|_| self.wet > 0.0) else {
            if self.dry != 1.0 {
                for s in buffer.left.iter_mut().chain(buffer.right.iter_mut()) {
                    *s *= self.dry;
                }
            }
            return;
        };

        let mut planner = RealFftPlanner::<f32>::new();
        let wet = convolve(&buffer.left, &ir.left, &mut planner)
            .and_then(|l| convolve(&buffer.right, &ir.right, &mut planner).map(|r| (l, r)));
        let (wet_l, wet_r) = match wet {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "reverb convolution failed; leaving signal dry");
                return;
            }
        };

        let wet_gain = self.wet * ir.normalization() as f32;
        for (s, w) in buffer.left.iter_mut().zip(&wet_l) {
            *s = *s * self.dry + w * wet_gain;
        }
        for (s, w) in buffer.right.iter_mut().zip(&wet_r) {
            *s = *s * self.dry + w * wet_gain;
        }
    }
}
