//! Stereo sample buffers and timeline-positioned buses.

/// Two equally sized channels of f32 samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBuffer {
    /// Silence of `frames` samples per channel.
    pub fn new(frames: usize) -> Self {
        StereoBuffer {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    pub fn from_channels(left: Vec<f32>, right: Vec<f32>) -> Self {
        debug_assert_eq!(left.len(), right.len());
        StereoBuffer { left, right }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Add `other` into this buffer starting at frame `offset`; anything
    /// past the end is dropped.
    pub fn mix_from(&mut self, other: &StereoBuffer, offset: usize) {
        if offset >= self.len() {
            return;
        }
        let n = other.len().min(self.len() - offset);
        for (dst, src) in self.left[offset..offset + n].iter_mut().zip(&other.left[..n]) {
            *dst += *src;
        }
        for (dst, src) in self.right[offset..offset + n].iter_mut().zip(&other.right[..n]) {
            *dst += *src;
        }
    }

    /// Largest absolute sample across both channels.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(self.right.iter())
            .fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    /// Sum of squared samples across both channels.
    pub fn energy(&self) -> f64 {
        self.left
            .iter()
            .chain(self.right.iter())
            .map(|&s| s as f64 * s as f64)
            .sum()
    }
}

/// A buffer placed on the render timeline at a frame offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bus {
    pub offset: usize,
    pub buffer: StereoBuffer,
}

impl Bus {
    pub fn new(offset: usize, frames: usize) -> Self {
        Bus {
            offset,
            buffer: StereoBuffer::new(frames),
        }
    }

    /// First frame past the end of this bus.
    pub fn end(&self) -> usize {
        self.offset + self.buffer.len()
    }

    /// Sum another bus into this one, aligning by timeline position.
    pub fn mix_from(&mut self, other: &Bus) {
        if other.offset >= self.offset {
            self.buffer.mix_from(&other.buffer, other.offset - self.offset);
        } else {
            // Child starts before this bus; skip its leading frames.
            let skip = self.offset - other.offset;
            if skip >= other.buffer.len() {
                return;
            }
            let trimmed = StereoBuffer::from_channels(
                other.buffer.left[skip..].to_vec(),
                other.buffer.right[skip..].to_vec(),
            );
            self.buffer.mix_from(&trimmed, 0);
        }
    }
}
