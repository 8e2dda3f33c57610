//! Decoded sample data and region playback.
//!
//! Plays a sample from a trim offset with linear-interpolation resampling
//! when the file's sample rate differs from the render rate.

use std::sync::Arc;

/// Decoded PCM audio, one `Vec<f32>` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub channels: Vec<Vec<f32>>,
    /// Native sample rate of the audio.
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        SampleBuffer {
            channels,
            sample_rate,
        }
    }

    pub fn mono(data: Vec<f32>, sample_rate: u32) -> Self {
        SampleBuffer::new(vec![data], sample_rate)
    }

    /// Frames per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Read channel `ch` at a fractional position. Mono data feeds both
    /// output channels.
    pub fn read_interpolated(&self, ch: usize, position: f64) -> f64 {
        let Some(data) = self.channels.get(ch).or_else(|| self.channels.first()) else {
            return 0.0;
        };
        if data.is_empty() || position < 0.0 {
            return 0.0;
        }

        let idx = position as usize;
        if idx >= data.len() - 1 {
            return if idx < data.len() { data[idx] as f64 } else { 0.0 };
        }

        let frac = position - idx as f64;
        data[idx] as f64 * (1.0 - frac) + data[idx + 1] as f64 * frac
    }
}

/// A playing audio-region voice.
#[derive(Debug, Clone)]
pub struct SampleVoice {
    buffer: Arc<SampleBuffer>,
    /// Current read position in the sample buffer (fractional frames).
    position: f64,
    /// Source frames advanced per output frame.
    step: f64,
    /// Output frames left before the region ends.
    remaining: usize,
    finished: bool,
}

impl SampleVoice {
    /// Play `buffer` from `trim_start` seconds for at most `frames` output
    /// frames at `engine_sample_rate`.
    pub fn new(
        buffer: Arc<SampleBuffer>,
        trim_start: f64,
        frames: usize,
        engine_sample_rate: f64,
    ) -> Self {
        let source_rate = buffer.sample_rate as f64;
        let position = trim_start.max(0.0) * source_rate;
        let step = if engine_sample_rate > 0.0 {
            source_rate / engine_sample_rate
        } else {
            0.0
        };
        let finished = step <= 0.0 || frames == 0 || position >= buffer.len() as f64;
        SampleVoice {
            buffer,
            position,
            step,
            remaining: frames,
            finished,
        }
    }

    /// Generate the next stereo frame.
    pub fn next_frame(&mut self) -> [f64; 2] {
        if self.finished {
            return [0.0, 0.0];
        }
        let frame = [
            self.buffer.read_interpolated(0, self.position),
            self.buffer.read_interpolated(1, self.position),
        ];
        self.position += self.step;
        self.remaining -= 1;
        if self.remaining == 0 || self.position >= self.buffer.len() as f64 {
            self.finished = true;
        }
        frame
    }

    /// Audio regions stop dead at their end; fades live on the clip chain.
    pub fn note_off(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
