//! Percussion synthesis.
//!
//! Each drum kind has its own voice topology; there is no shared generic
//! drum algorithm. All kinds share the velocity curve, an ADSR amplitude
//! stage and the same stop behaviour: amplitude and any filter frequency
//! fall exponentially over the release time.

use tracing::debug;

use crate::dsp::envelope::{Adsr, Envelope};
use crate::dsp::filter::{BiquadFilter, FilterType};
use crate::dsp::noise::{NoiseBuffer, NoiseReader};
use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::project::MidiNote;

use super::{ActiveVoice, NoteTiming, VoiceHandle, VoiceQueue, velocity_gain};

/// Frequency a stopped voice's filter falls towards.
const FILTER_FLOOR_HZ: f64 = 20.0;

/// Onsets of the four clap bursts, seconds.
const CLAP_BURSTS: [f64; 4] = [0.0, 0.010, 0.020, 0.030];
/// Decay time constant of each clap burst, seconds.
const CLAP_BURST_DECAY: f64 = 0.012;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrumKind {
    Kick,
    Snare,
    HiHat,
    OpenHat,
    Crash,
    Ride,
    Tom,
    Clap,
    Rim,
    Cowbell,
}

/// General MIDI percussion map. Pitches outside the map have no sound.
pub fn drum_kind_for(pitch: u8) -> Option<DrumKind> {
    match pitch {
        35 | 36 => Some(DrumKind::Kick),
        37 => Some(DrumKind::Rim),
        38 | 40 => Some(DrumKind::Snare),
        39 => Some(DrumKind::Clap),
        42 | 44 => Some(DrumKind::HiHat),
        46 => Some(DrumKind::OpenHat),
        49 | 52 | 55 | 57 => Some(DrumKind::Crash),
        51 | 53 | 59 => Some(DrumKind::Ride),
        41 | 43 | 45 | 47 | 48 | 50 => Some(DrumKind::Tom),
        56 => Some(DrumKind::Cowbell),
        _ => None,
    }
}

/// Tom fundamental for a GM tom pitch, low floor tom up to high tom.
fn tom_frequency(pitch: u8) -> f64 {
    match pitch {
        41 => 80.0,
        43 => 100.0,
        45 => 120.0,
        47 => 150.0,
        48 => 180.0,
        _ => 220.0,
    }
}

/// Sound parameters for one drum kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrumParams {
    /// Fundamental, Hz.
    pub frequency: f64,
    /// Pitch sweep start, as a multiple of `frequency`.
    pub start_mult: f64,
    /// Pitch sweep end, as a multiple of `frequency`.
    pub end_mult: f64,
    /// Length of the pitch sweep, seconds.
    pub pitch_decay: f64,
    /// Noise share of the mix, 0–1.
    pub noise_level: f64,
    /// Noise filter frequency, Hz.
    pub filter_frequency: f64,
    pub envelope: Adsr,
    pub volume: f64,
}

impl DrumParams {
    pub fn preset(kind: DrumKind, pitch: u8) -> Self {
        let base = DrumParams {
            frequency: 0.0,
            start_mult: 1.0,
            end_mult: 1.0,
            pitch_decay: 0.0,
            noise_level: 0.0,
            filter_frequency: 0.0,
            envelope: Adsr::new(0.001, 0.2, 0.0, 0.05),
            volume: 0.8,
        };
        match kind {
            DrumKind::Kick => DrumParams {
                frequency: 55.0,
                start_mult: 3.0,
                end_mult: 1.0,
                pitch_decay: 0.05,
                envelope: Adsr::new(0.001, 0.4, 0.0, 0.05),
                volume: 1.0,
                ..base
            },
            DrumKind::Tom => DrumParams {
                frequency: tom_frequency(pitch),
                start_mult: 1.6,
                end_mult: 1.0,
                pitch_decay: 0.08,
                envelope: Adsr::new(0.001, 0.3, 0.0, 0.1),
                ..base
            },
            DrumKind::Snare => DrumParams {
                frequency: 185.0,
                noise_level: 0.6,
                envelope: Adsr::new(0.001, 0.15, 0.0, 0.05),
                ..base
            },
            DrumKind::HiHat => DrumParams {
                filter_frequency: 8000.0,
                noise_level: 1.0,
                envelope: Adsr::new(0.001, 0.05, 0.0, 0.03),
                volume: 0.5,
                ..base
            },
            DrumKind::OpenHat => DrumParams {
                filter_frequency: 8000.0,
                noise_level: 1.0,
                envelope: Adsr::new(0.001, 0.3, 0.0, 0.1),
                volume: 0.5,
                ..base
            },
            DrumKind::Crash => DrumParams {
                frequency: 300.0,
                noise_level: 0.8,
                filter_frequency: 5000.0,
                envelope: Adsr::new(0.001, 1.5, 0.0, 0.5),
                volume: 0.6,
                ..base
            },
            DrumKind::Ride => DrumParams {
                frequency: 420.0,
                noise_level: 0.5,
                filter_frequency: 6000.0,
                envelope: Adsr::new(0.001, 1.0, 0.0, 0.4),
                volume: 0.5,
                ..base
            },
            DrumKind::Clap => DrumParams {
                noise_level: 1.0,
                filter_frequency: 1500.0,
                envelope: Adsr::new(0.001, 0.2, 0.0, 0.05),
                volume: 0.7,
                ..base
            },
            DrumKind::Rim => DrumParams {
                frequency: 1700.0,
                envelope: Adsr::new(0.0005, 0.02, 0.0, 0.01),
                volume: 0.6,
                ..base
            },
            DrumKind::Cowbell => DrumParams {
                frequency: 560.0,
                envelope: Adsr::new(0.001, 0.25, 0.0, 0.05),
                volume: 0.6,
                ..base
            },
        }
    }
}

/// Per-kind signal source.
#[derive(Debug, Clone)]
enum Body {
    /// Kick and toms: sine with an exponential pitch sweep.
    Swept {
        osc: Oscillator,
        from: f64,
        to: f64,
        sweep_samples: usize,
        t: usize,
    },
    Snare {
        tone: Oscillator,
        noise: NoiseReader,
        noise_level: f64,
    },
    /// Hats: high-passed noise.
    Hat {
        noise: NoiseReader,
        filter: BiquadFilter,
    },
    /// Crash and ride: filtered noise over two sine partials.
    Metal {
        noise: NoiseReader,
        filter: BiquadFilter,
        partials: [Oscillator; 2],
        noise_level: f64,
    },
    Clap {
        noise: NoiseReader,
        filter: BiquadFilter,
        onsets: [usize; 4],
        burst_decay: f64,
        t: usize,
    },
    Rim {
        osc: Oscillator,
    },
    Cowbell {
        square: Oscillator,
        triangle: Oscillator,
    },
}

impl Body {
    fn new(kind: DrumKind, p: &DrumParams, noise: &NoiseBuffer, sr: f64) -> Self {
        match kind {
            DrumKind::Kick | DrumKind::Tom => Body::Swept {
                osc: Oscillator::with_frequency(Waveform::Sine, p.frequency * p.start_mult, sr),
                from: p.frequency * p.start_mult,
                to: p.frequency * p.end_mult,
                sweep_samples: (p.pitch_decay * sr) as usize,
                t: 0,
            },
            DrumKind::Snare => Body::Snare {
                tone: Oscillator::with_frequency(Waveform::Triangle, p.frequency, sr),
                noise: noise.reader(),
                noise_level: p.noise_level.clamp(0.0, 1.0),
            },
            DrumKind::HiHat | DrumKind::OpenHat => Body::Hat {
                noise: noise.reader(),
                filter: BiquadFilter::with_params(
                    FilterType::Highpass,
                    sr,
                    p.filter_frequency,
                    0.707,
                    0.0,
                ),
            },
            DrumKind::Crash | DrumKind::Ride => Body::Metal {
                noise: noise.reader(),
                filter: BiquadFilter::with_params(
                    FilterType::Highpass,
                    sr,
                    p.filter_frequency,
                    0.707,
                    0.0,
                ),
                partials: [
                    Oscillator::with_frequency(Waveform::Sine, p.frequency, sr),
                    Oscillator::with_frequency(Waveform::Sine, p.frequency * 1.5, sr),
                ],
                noise_level: p.noise_level.clamp(0.0, 1.0),
            },
            DrumKind::Clap => Body::Clap {
                noise: noise.reader(),
                filter: BiquadFilter::with_params(
                    FilterType::Bandpass,
                    sr,
                    p.filter_frequency,
                    1.0,
                    0.0,
                ),
                onsets: CLAP_BURSTS.map(|s| (s * sr) as usize),
                burst_decay: (CLAP_BURST_DECAY * sr).max(1.0),
                t: 0,
            },
            DrumKind::Rim => Body::Rim {
                osc: Oscillator::with_frequency(Waveform::Square, p.frequency, sr),
            },
            DrumKind::Cowbell => Body::Cowbell {
                square: Oscillator::with_frequency(Waveform::Square, p.frequency, sr),
                triangle: Oscillator::with_frequency(Waveform::Triangle, p.frequency * 1.5, sr),
            },
        }
    }

    fn next_sample(&mut self) -> f64 {
        match self {
            Body::Swept {
                osc,
                from,
                to,
                sweep_samples,
                t,
            } => {
                osc.set_frequency(if *t < *sweep_samples && *from > 0.0 && *to > 0.0 {
                    *from * (*to / *from).powf(*t as f64 / *sweep_samples as f64)
                } else {
                    *to
                });
                *t += 1;
                osc.next_sample()
            }
            Body::Snare {
                tone,
                noise,
                noise_level,
            } => tone.next_sample() * (1.0 - *noise_level) + noise.next_sample() * *noise_level,
            Body::Hat { noise, filter } => filter.process(noise.next_sample()),
            Body::Metal {
                noise,
                filter,
                partials,
                noise_level,
            } => {
                let tone = (partials[0].next_sample() + partials[1].next_sample()) * 0.5;
                filter.process(noise.next_sample()) * *noise_level + tone * (1.0 - *noise_level)
            }
            Body::Clap {
                noise,
                filter,
                onsets,
                burst_decay,
                t,
            } => {
                let level = clap_level(*t, onsets, *burst_decay);
                *t += 1;
                filter.process(noise.next_sample()) * level
            }
            Body::Rim { osc } => osc.next_sample(),
            Body::Cowbell { square, triangle } => {
                (square.next_sample() + triangle.next_sample()) * 0.5
            }
        }
    }

    fn filter_mut(&mut self) -> Option<&mut BiquadFilter> {
        match self {
            Body::Hat { filter, .. } | Body::Metal { filter, .. } | Body::Clap { filter, .. } => {
                Some(filter)
            }
            _ => None,
        }
    }
}

/// Summed burst envelopes of a clap at sample `t`, capped at 1.
fn clap_level(t: usize, onsets: &[usize; 4], burst_decay: f64) -> f64 {
    let level: f64 = onsets
        .iter()
        .filter(|&&on| t >= on)
        .map(|&on| (-((t - on) as f64) / burst_decay).exp())
        .sum();
    level.min(1.0)
}

/// One sounding drum hit.
#[derive(Debug, Clone)]
pub struct DrumVoice {
    kind: DrumKind,
    body: Body,
    env: Envelope,
    gain: f64,
    sample_rate: f64,
    /// Per-sample filter frequency multiplier once stopped.
    filter_fall: Option<f64>,
}

impl DrumVoice {
    pub fn new(
        kind: DrumKind,
        params: &DrumParams,
        velocity: u8,
        noise: &NoiseBuffer,
        sample_rate: f64,
    ) -> Self {
        let mut env = Envelope::new(params.envelope, sample_rate);
        env.gate_on();
        DrumVoice {
            kind,
            body: Body::new(kind, params, noise, sample_rate),
            env,
            gain: velocity_gain(velocity, params.volume),
            sample_rate,
            filter_fall: None,
        }
    }

    pub fn kind(&self) -> DrumKind {
        self.kind
    }

    pub fn next_sample(&mut self) -> f64 {
        if self.env.is_finished() {
            return 0.0;
        }
        if let (Some(fall), Some(filter)) = (self.filter_fall, self.body.filter_mut()) {
            let f = (filter.frequency * fall).max(FILTER_FLOOR_HZ);
            filter.set_frequency(f);
        }
        self.body.next_sample() * self.env.next_sample() * self.gain
    }

    /// Release amplitude, and pull any filter down to 20 Hz over the same
    /// time.
    pub fn note_off(&mut self) {
        if self.env.is_finished() || self.env.is_releasing() {
            return;
        }
        self.env.gate_off();
        let release_samples = self.env.shape.release * self.sample_rate;
        if let Some(filter) = self.body.filter_mut() {
            if release_samples >= 1.0 && filter.frequency > FILTER_FLOOR_HZ {
                self.filter_fall =
                    Some((FILTER_FLOOR_HZ / filter.frequency).powf(1.0 / release_samples));
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.env.is_finished()
    }

    pub fn release_seconds(&self) -> f64 {
        self.env.shape.release
    }

    pub fn filter_frequency(&self) -> Option<f64> {
        match &self.body {
            Body::Hat { filter, .. } | Body::Metal { filter, .. } | Body::Clap { filter, .. } => {
                Some(filter.frequency)
            }
            _ => None,
        }
    }
}

/// Drum voice factory sharing one noise buffer across every hit.
#[derive(Debug, Clone)]
pub struct DrumEngine {
    noise: NoiseBuffer,
    sample_rate: f64,
}

impl DrumEngine {
    pub fn new(noise: NoiseBuffer, sample_rate: f64) -> Self {
        DrumEngine { noise, sample_rate }
    }

    pub fn voice(&self, note: &MidiNote) -> Option<DrumVoice> {
        let kind = drum_kind_for(note.pitch)?;
        let params = DrumParams::preset(kind, note.pitch);
        Some(DrumVoice::new(
            kind,
            &params,
            note.velocity,
            &self.noise,
            self.sample_rate,
        ))
    }

    /// Queue `note`; unmapped pitches are skipped.
    pub fn trigger(
        &self,
        queue: &mut VoiceQueue,
        note: &MidiNote,
        timing: NoteTiming,
    ) -> Option<VoiceHandle> {
        let Some(voice) = self.voice(note) else {
            debug!(pitch = note.pitch, "no drum mapped to pitch; skipping");
            return None;
        };
        queue.push(ActiveVoice::Drum(voice), timing)
    }
}
