//! Parameter-only stages: gain, pan and linear fades.

use std::f32::consts::FRAC_PI_2;

use crate::dsp::buffer::StereoBuffer;

/// Linear gain.
#[derive(Debug, Clone, PartialEq)]
pub struct Gain {
    pub value: f32,
}

impl Gain {
    pub fn new(value: f32) -> Self {
        Gain { value }
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.value == 1.0 {
            return;
        }
        for s in buffer.left.iter_mut().chain(buffer.right.iter_mut()) {
            *s *= self.value;
        }
    }
}

/// Equal-power stereo panner for stereo input, unity at centre.
#[derive(Debug, Clone, PartialEq)]
pub struct Pan {
    /// -1 (hard left) to 1 (hard right).
    pub value: f32,
}

impl Pan {
    pub fn new(value: f32) -> Self {
        Pan {
            value: value.clamp(-1.0, 1.0),
        }
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let p = self.value;
        if p == 0.0 {
            return;
        }
        let x = if p < 0.0 { p + 1.0 } else { p };
        let (gain_l, gain_r) = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
        for (l, r) in buffer.left.iter_mut().zip(buffer.right.iter_mut()) {
            let (in_l, in_r) = (*l, *r);
            if p < 0.0 {
                *l = in_l + in_r * gain_l;
                *r = in_r * gain_r;
            } else {
                *l = in_l * gain_l;
                *r = in_r + in_l * gain_r;
            }
        }
    }
}

/// Linear fade relative to the start of the buffer it runs on. `offset`
/// frames of the fade's timeline have already passed at buffer frame 0.
#[derive(Debug, Clone, PartialEq)]
pub enum Fade {
    In { frames: usize, offset: usize },
    Out { start: usize, frames: usize, offset: usize },
}

impl Fade {
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let len = buffer.len();
        for i in 0..len {
            let g = self.gain_at(i);
            if g != 1.0 {
                buffer.left[i] *= g;
                buffer.right[i] *= g;
            }
        }
    }

    fn gain_at(&self, i: usize) -> f32 {
        match *self {
            Fade::In { frames, offset } => {
                let i = i + offset;
                if i >= frames {
                    1.0
                } else {
                    i as f32 / frames as f32
                }
            }
            Fade::Out { start, frames, offset } => {
                let i = i + offset;
                if i < start {
                    1.0
                } else if frames == 0 || i >= start + frames {
                    0.0
                } else {
                    1.0 - (i - start) as f32 / frames as f32
                }
            }
        }
    }
}
