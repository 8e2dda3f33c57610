//! Realized processing stages. Each one runs over a whole stereo buffer in
//! place.

pub mod delay;
pub mod distortion;
pub mod dynamics;
pub mod eq;
pub mod gain;
pub mod phaser;
pub mod reverb;

pub use delay::{Delay, Flanger};
pub use distortion::{CurveKind, Waveshaper, make_curve};
pub use dynamics::Dynamics;
pub use eq::{StereoBiquad, eq_bands};
pub use gain::{Fade, Gain, Pan};
pub use phaser::Phaser;
pub use reverb::{ReverbMix, convolve};
