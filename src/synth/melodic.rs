//! Subtractive melodic voice: two detunable oscillators plus a sub
//! oscillator, one resonant filter with its own envelope, an amplitude
//! envelope and an optional sine LFO.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::dsp::envelope::{Adsr, Envelope};
use crate::dsp::filter::{BiquadFilter, FilterType};
use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::project::MidiNote;

use super::{ActiveVoice, NoteTiming, VoiceHandle, VoiceQueue, midi_to_frequency, velocity_gain};

/// Samples between filter coefficient updates.
const CONTROL_INTERVAL: usize = 32;

/// Lowest cutoff the filter envelope may reach.
const MIN_CUTOFF: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LfoTarget {
    /// Depth in Hz added to the oscillator frequency.
    Pitch,
    /// Depth in Hz added to the filter cutoff.
    Filter,
    /// Depth as a fraction of the amplitude.
    Amplitude,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lfo {
    pub target: LfoTarget,
    /// Hz
    pub rate: f64,
    pub depth: f64,
}

/// Sound design for an instrument track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SynthParams {
    pub osc1_waveform: Waveform,
    pub osc2_waveform: Waveform,
    /// Cents.
    pub osc2_detune: f64,
    pub osc1_level: f64,
    pub osc2_level: f64,
    pub sub_level: f64,
    pub filter_type: FilterType,
    /// Hz
    pub filter_cutoff: f64,
    /// Filter Q.
    pub filter_resonance: f64,
    /// Envelope peak moves the cutoff to `cutoff * (1 + amount)`.
    pub filter_env_amount: f64,
    pub amp_envelope: Adsr,
    pub filter_envelope: Adsr,
    pub lfo: Option<Lfo>,
    pub volume: f64,
    /// Pre-filter saturation, 0 disables it.
    pub drive: f64,
}

impl Default for SynthParams {
    fn default() -> Self {
        SynthParams {
            osc1_waveform: Waveform::Sawtooth,
            osc2_waveform: Waveform::Sawtooth,
            osc2_detune: 7.0,
            osc1_level: 0.5,
            osc2_level: 0.3,
            sub_level: 0.2,
            filter_type: FilterType::Lowpass,
            filter_cutoff: 2000.0,
            filter_resonance: 1.0,
            filter_env_amount: 2.0,
            amp_envelope: Adsr::new(0.01, 0.2, 0.7, 0.3),
            filter_envelope: Adsr::new(0.01, 0.3, 0.3, 0.3),
            lfo: None,
            volume: 0.8,
            drive: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct LfoState {
    target: LfoTarget,
    depth: f64,
    phase: f64,
    increment: f64,
}

impl LfoState {
    fn next_value(&mut self) -> f64 {
        let v = (TAU * self.phase).sin();
        self.phase = (self.phase + self.increment) % 1.0;
        v
    }
}

/// One sounding melodic note.
#[derive(Debug, Clone)]
pub struct MelodicVoice {
    osc1: Oscillator,
    osc2: Oscillator,
    sub: Oscillator,
    levels: [f64; 3],
    drive: f64,
    frequency: f64,

    filter: BiquadFilter,
    base_cutoff: f64,
    env_amount: f64,
    max_cutoff: f64,

    amp_env: Envelope,
    filter_env: Envelope,
    lfo: Option<LfoState>,

    gain: f64,
    counter: usize,
}

impl MelodicVoice {
    pub fn new(params: &SynthParams, note: u8, velocity: u8, sample_rate: f64) -> Self {
        let frequency = midi_to_frequency(note);
        let osc2 = Oscillator::with_frequency(params.osc2_waveform, frequency, sample_rate)
            .detuned(params.osc2_detune);

        let mut amp_env = Envelope::new(params.amp_envelope, sample_rate);
        let mut filter_env = Envelope::new(params.filter_envelope, sample_rate);
        amp_env.gate_on();
        filter_env.gate_on();

        let lfo = params.lfo.filter(|l| l.rate > 0.0).map(|l| LfoState {
            target: l.target,
            depth: l.depth,
            phase: 0.0,
            increment: l.rate / sample_rate,
        });

        MelodicVoice {
            osc1: Oscillator::with_frequency(params.osc1_waveform, frequency, sample_rate),
            osc2,
            sub: Oscillator::with_frequency(Waveform::Sine, frequency / 2.0, sample_rate),
            levels: [params.osc1_level, params.osc2_level, params.sub_level],
            drive: params.drive.max(0.0),
            frequency,
            filter: BiquadFilter::with_params(
                params.filter_type,
                sample_rate,
                params.filter_cutoff,
                params.filter_resonance,
                0.0,
            ),
            base_cutoff: params.filter_cutoff,
            env_amount: params.filter_env_amount,
            max_cutoff: sample_rate / 6.0,
            amp_env,
            filter_env,
            lfo,
            gain: velocity_gain(velocity, params.volume),
            counter: 0,
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        if self.amp_env.is_finished() {
            return 0.0;
        }

        let (target, modulation) = match self.lfo.as_mut() {
            Some(lfo) => {
                let v = lfo.next_value() * lfo.depth;
                (Some(lfo.target), v)
            }
            None => (None, 0.0),
        };

        if target == Some(LfoTarget::Pitch) {
            let f = (self.frequency + modulation).max(0.0);
            self.osc1.set_frequency(f);
            self.osc2.set_frequency(f);
            self.sub.set_frequency(f / 2.0);
        }

        let mut mix = self.osc1.next_sample() * self.levels[0]
            + self.osc2.next_sample() * self.levels[1]
            + self.sub.next_sample() * self.levels[2];
        if self.drive > 0.0 {
            let k = 1.0 + self.drive;
            mix = (mix * k).tanh() / k.tanh();
        }

        let filter_level = self.filter_env.next_sample();
        if self.counter % CONTROL_INTERVAL == 0 {
            let mut cutoff = self.base_cutoff * (1.0 + self.env_amount * filter_level);
            if target == Some(LfoTarget::Filter) {
                cutoff += modulation;
            }
            self.filter
                .set_frequency(cutoff.clamp(MIN_CUTOFF, self.max_cutoff.max(MIN_CUTOFF)));
        }
        self.counter += 1;

        let filtered = self.filter.process(mix);

        let mut amp = self.amp_env.next_sample() * self.gain;
        if target == Some(LfoTarget::Amplitude) {
            amp *= (1.0 + modulation).max(0.0);
        }
        filtered * amp
    }

    /// Start the release from the envelope's current level.
    pub fn note_off(&mut self) {
        self.amp_env.gate_off();
        self.filter_env.gate_off();
    }

    pub fn is_finished(&self) -> bool {
        self.amp_env.is_finished()
    }

    pub fn release_seconds(&self) -> f64 {
        self.amp_env.shape.release
    }
}

/// Melodic voice factory for one instrument track.
#[derive(Debug, Clone)]
pub struct MelodicEngine {
    params: SynthParams,
    sample_rate: f64,
}

impl MelodicEngine {
    pub fn new(params: SynthParams, sample_rate: f64) -> Self {
        MelodicEngine {
            params,
            sample_rate,
        }
    }

    pub fn params(&self) -> &SynthParams {
        &self.params
    }

    pub fn voice(&self, note: &MidiNote) -> MelodicVoice {
        MelodicVoice::new(&self.params, note.pitch, note.velocity, self.sample_rate)
    }

    /// Queue `note` to sound over `timing`.
    pub fn trigger(
        &self,
        queue: &mut VoiceQueue,
        note: &MidiNote,
        timing: NoteTiming,
    ) -> Option<VoiceHandle> {
        queue.push(ActiveVoice::Melodic(self.voice(note)), timing)
    }
}
