//! Stereo biquad stage and the five-band EQ built from it.

use crate::dsp::buffer::StereoBuffer;
use crate::dsp::filter::{BiquadFilter, FilterType};
use crate::graph::node::{EqBand, EqParams};

/// One biquad per channel with shared settings.
#[derive(Debug, Clone)]
pub struct StereoBiquad {
    left: BiquadFilter,
    right: BiquadFilter,
}

impl StereoBiquad {
    pub fn new(filter_type: FilterType, sample_rate: f64, frequency: f64, q: f64, gain_db: f64) -> Self {
        let filter = BiquadFilter::with_params(filter_type, sample_rate, frequency, q, gain_db);
        StereoBiquad {
            left: filter.clone(),
            right: filter,
        }
    }

    pub fn filter_type(&self) -> FilterType {
        self.left.filter_type
    }

    pub fn frequency(&self) -> f64 {
        self.left.frequency
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for s in buffer.left.iter_mut() {
            *s = self.left.process(*s as f64) as f32;
        }
        for s in buffer.right.iter_mut() {
            *s = self.right.process(*s as f64) as f32;
        }
    }
}

/// Low shelf, three peaking bands, high shelf, in series.
pub fn eq_bands(params: &EqParams, sample_rate: f64) -> [StereoBiquad; 5] {
    let band = |filter_type, b: &EqBand| {
        StereoBiquad::new(
            filter_type,
            sample_rate,
            b.frequency as f64,
            b.q as f64,
            b.gain as f64,
        )
    };
    [
        band(FilterType::Lowshelf, &params.low),
        band(FilterType::Peaking, &params.low_mid),
        band(FilterType::Peaking, &params.mid),
        band(FilterType::Peaking, &params.high_mid),
        band(FilterType::Highshelf, &params.high),
    ]
}
