//! DSP primitives shared by the synthesis engines and the effect graph.
//!
//! Everything here is plain sample-by-sample Rust with no audio runtime,
//! so renders are deterministic and testable in isolation.

pub mod buffer;
pub mod envelope;
pub mod filter;
pub mod noise;
pub mod oscillator;
pub mod sampler;

pub use buffer::{Bus, StereoBuffer};
pub use envelope::{Adsr, Envelope, ENVELOPE_FLOOR};
pub use filter::{BiquadFilter, FilterType};
pub use noise::{NoiseBuffer, NoiseReader};
pub use oscillator::{Oscillator, Waveform};
pub use sampler::{SampleBuffer, SampleVoice};

/// Convert decibels to linear amplitude.
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, floored at -120 dB.
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        -120.0
    } else {
        20.0 * linear.log10()
    }
}
