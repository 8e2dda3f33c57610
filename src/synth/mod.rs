//! Note synthesis.
//!
//! Engines turn MIDI notes into voices; a [`VoiceQueue`] holds those voices
//! against absolute note-on/note-off sample offsets and renders them into a
//! clip bus in one deterministic pass.

pub mod drums;
pub mod melodic;

pub use drums::{DrumEngine, DrumKind, DrumParams, DrumVoice, drum_kind_for};
pub use melodic::{Lfo, LfoTarget, MelodicEngine, MelodicVoice, SynthParams};

use tracing::{trace, warn};

use crate::dsp::buffer::Bus;
use crate::dsp::sampler::SampleVoice;

/// Equal-tempered frequency of a MIDI note, A4 (69) = 440 Hz.
#[inline]
pub fn midi_to_frequency(note: u8) -> f64 {
    440.0 * 2.0_f64.powf((note as f64 - 69.0) / 12.0)
}

/// Perceptual velocity curve: `(velocity / 127)^1.5 * volume`.
#[inline]
pub fn velocity_gain(velocity: u8, volume: f64) -> f64 {
    let v = velocity.min(127) as f64 / 127.0;
    v.powf(1.5) * volume
}

/// Note-on and note-off positions on the render timeline, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteTiming {
    pub start: usize,
    pub end: usize,
}

impl NoteTiming {
    pub fn new(start: usize, end: usize) -> Self {
        NoteTiming { start, end }
    }

    pub fn frames(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Any voice that can sit in a [`VoiceQueue`].
#[derive(Debug, Clone)]
pub enum ActiveVoice {
    Melodic(MelodicVoice),
    Drum(DrumVoice),
    Sample(SampleVoice),
}

impl ActiveVoice {
    pub fn next_frame(&mut self) -> [f64; 2] {
        match self {
            ActiveVoice::Melodic(v) => {
                let s = v.next_sample();
                [s, s]
            }
            ActiveVoice::Drum(v) => {
                let s = v.next_sample();
                [s, s]
            }
            ActiveVoice::Sample(v) => v.next_frame(),
        }
    }

    pub fn note_off(&mut self) {
        match self {
            ActiveVoice::Melodic(v) => v.note_off(),
            ActiveVoice::Drum(v) => v.note_off(),
            ActiveVoice::Sample(v) => v.note_off(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            ActiveVoice::Melodic(v) => v.is_finished(),
            ActiveVoice::Drum(v) => v.is_finished(),
            ActiveVoice::Sample(v) => v.is_finished(),
        }
    }

    /// Seconds the voice keeps sounding after note-off.
    pub fn release_seconds(&self) -> f64 {
        match self {
            ActiveVoice::Melodic(v) => v.release_seconds(),
            ActiveVoice::Drum(v) => v.release_seconds(),
            ActiveVoice::Sample(_) => 0.0,
        }
    }
}

/// Handle to a queued voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceHandle {
    index: usize,
    /// Sample at which the voice has fully decayed.
    pub end: usize,
}

#[derive(Debug, Clone)]
struct QueuedVoice {
    voice: ActiveVoice,
    on: usize,
    off: usize,
    release_frames: usize,
}

impl QueuedVoice {
    fn end(&self) -> usize {
        self.off + self.release_frames
    }
}

/// Explicit note event list for one clip.
///
/// Voices are only accepted when their note-on falls inside
/// `[offset, offset + capacity)`; everything is rendered relative to the
/// absolute timeline, so a clip's bus can start anywhere.
#[derive(Debug, Clone)]
pub struct VoiceQueue {
    offset: usize,
    capacity: usize,
    sample_rate: f64,
    voices: Vec<QueuedVoice>,
}

impl VoiceQueue {
    pub fn new(offset: usize, capacity: usize, sample_rate: f64) -> Self {
        VoiceQueue {
            offset,
            capacity,
            sample_rate,
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Queue a voice. Returns `None` when the queue cannot host it, in
    /// which case the note is dropped and the render carries on.
    pub fn push(&mut self, voice: ActiveVoice, timing: NoteTiming) -> Option<VoiceHandle> {
        if self.sample_rate <= 0.0 {
            warn!("voice queue has no sample rate; dropping note");
            return None;
        }
        if timing.start < self.offset || timing.start >= self.offset + self.capacity {
            warn!(
                start = timing.start,
                offset = self.offset,
                capacity = self.capacity,
                "note starts outside its clip; dropping"
            );
            return None;
        }
        if timing.end <= timing.start {
            trace!(start = timing.start, "zero-length note skipped");
            return None;
        }

        let release_frames = (voice.release_seconds().max(0.0) * self.sample_rate).ceil() as usize;
        let queued = QueuedVoice {
            voice,
            on: timing.start,
            off: timing.end,
            release_frames,
        };
        let handle = VoiceHandle {
            index: self.voices.len(),
            end: queued.end(),
        };
        self.voices.push(queued);
        Some(handle)
    }

    /// Move a voice's note-off earlier. Returns the updated handle, or
    /// `None` if `at` is not earlier than the current note-off.
    pub fn stop(&mut self, handle: VoiceHandle, at: usize) -> Option<VoiceHandle> {
        let queued = self.voices.get_mut(handle.index)?;
        if at >= queued.off {
            return None;
        }
        queued.off = at.max(queued.on);
        Some(VoiceHandle {
            index: handle.index,
            end: queued.end(),
        })
    }

    /// Latest sample any queued voice still sounds at.
    pub fn latest_end(&self) -> usize {
        self.voices.iter().map(QueuedVoice::end).max().unwrap_or(self.offset)
    }

    /// Render every voice into `bus`, in queue order. Samples outside the
    /// bus are computed but discarded.
    pub fn render_into(&mut self, bus: &mut Bus) {
        let bus_start = bus.offset;
        let bus_end = bus.end();
        for queued in &mut self.voices {
            let mut pos = queued.on;
            while pos < bus_end {
                if pos == queued.off {
                    queued.voice.note_off();
                }
                if queued.voice.is_finished() {
                    break;
                }
                let [l, r] = queued.voice.next_frame();
                if pos >= bus_start {
                    let i = pos - bus_start;
                    bus.buffer.left[i] += l as f32;
                    bus.buffer.right[i] += r as f32;
                }
                pos += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::sampler::SampleBuffer;
    use std::sync::Arc;

    fn ramp_voice(frames: usize) -> ActiveVoice {
        let data: Vec<f32> = (0..frames).map(|i| 0.1 * (i + 1) as f32).collect();
        let buffer = Arc::new(SampleBuffer::mono(data, 100));
        ActiveVoice::Sample(SampleVoice::new(buffer, 0.0, frames, 100.0))
    }

    #[test]
    fn frequency_of_a4_and_octaves() {
        assert!((midi_to_frequency(69) - 440.0).abs() < 1e-9);
        assert!((midi_to_frequency(81) - 880.0).abs() < 1e-9);
        assert!((midi_to_frequency(57) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn velocity_curve_endpoints_and_monotonic() {
        assert_eq!(velocity_gain(0, 0.8), 0.0);
        assert!((velocity_gain(127, 0.8) - 0.8).abs() < 1e-12);
        let mut prev = -1.0;
        for v in 0..=127u8 {
            let g = velocity_gain(v, 1.0);
            assert!(g > prev, "gain must rise with velocity at {v}");
            prev = g;
        }
        // Perceptual: half velocity is well under half gain.
        assert!(velocity_gain(64, 1.0) < 0.4);
    }

    #[test]
    fn queue_places_voices_at_absolute_offsets() {
        let mut queue = VoiceQueue::new(10, 20, 100.0);
        queue.push(ramp_voice(3), NoteTiming::new(12, 15)).unwrap();
        let mut bus = Bus::new(10, 8);
        queue.render_into(&mut bus);
        assert_eq!(bus.buffer.left[..2], [0.0, 0.0]);
        assert!((bus.buffer.left[2] - 0.1).abs() < 1e-6);
        assert!((bus.buffer.right[4] - 0.3).abs() < 1e-6);
        assert_eq!(bus.buffer.left[5], 0.0);
    }

    #[test]
    fn queue_rejects_out_of_window_and_empty_notes() {
        let mut queue = VoiceQueue::new(10, 20, 100.0);
        assert!(queue.push(ramp_voice(3), NoteTiming::new(5, 8)).is_none());
        assert!(queue.push(ramp_voice(3), NoteTiming::new(30, 33)).is_none());
        assert!(queue.push(ramp_voice(3), NoteTiming::new(12, 12)).is_none());
        assert!(queue.is_empty());

        let mut dead = VoiceQueue::new(0, 20, 0.0);
        assert!(dead.push(ramp_voice(3), NoteTiming::new(0, 3)).is_none());
    }

    #[test]
    fn early_stop_moves_note_off() {
        let mut queue = VoiceQueue::new(0, 100, 100.0);
        let handle = queue.push(ramp_voice(10), NoteTiming::new(0, 10)).unwrap();
        assert_eq!(handle.end, 10);
        let stopped = queue.stop(handle, 4).unwrap();
        assert_eq!(stopped.end, 4);
        assert!(queue.stop(stopped, 8).is_none());

        let mut bus = Bus::new(0, 10);
        queue.render_into(&mut bus);
        assert!(bus.buffer.left[3] > 0.0);
        assert_eq!(bus.buffer.left[4], 0.0);
    }

    #[test]
    fn voices_past_the_bus_are_truncated() {
        let mut queue = VoiceQueue::new(0, 100, 100.0);
        queue.push(ramp_voice(10), NoteTiming::new(6, 16)).unwrap();
        assert_eq!(queue.latest_end(), 16);
        let mut bus = Bus::new(0, 8);
        queue.render_into(&mut bus);
        assert!(bus.buffer.left[7] > 0.0);
    }
}
