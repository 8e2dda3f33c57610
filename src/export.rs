//! WAV hand-off for rendered output.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::debug;

use crate::error::ExportError;
use crate::render::RenderOutput;

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Clamp to [-1, 1] and scale to 16-bit PCM.
#[inline]
fn to_i16(sample: f32) -> i16 {
    let s = if sample.is_finite() { sample.clamp(-1.0, 1.0) } else { 0.0 };
    (s * i16::MAX as f32) as i16
}

fn write_samples<W: Write + Seek>(writer: &mut WavWriter<W>, output: &RenderOutput) -> Result<(), ExportError> {
    for (&l, &r) in output.buffer.left.iter().zip(&output.buffer.right) {
        writer.write_sample(to_i16(l))?;
        writer.write_sample(to_i16(r))?;
    }
    Ok(())
}

/// Encode as an in-memory 16-bit stereo WAV file.
pub fn encode_wav(output: &RenderOutput) -> Result<Vec<u8>, ExportError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec(output.sample_rate))?;
        write_samples(&mut writer, output)?;
        writer.finalize()?;
    }
    let bytes = cursor.into_inner();
    debug!(bytes = bytes.len(), frames = output.frames(), "wav encoded");
    Ok(bytes)
}

/// Write a 16-bit stereo WAV file to `path`.
pub fn write_wav(path: impl AsRef<Path>, output: &RenderOutput) -> Result<(), ExportError> {
    let mut writer = WavWriter::create(path.as_ref(), spec(output.sample_rate))?;
    write_samples(&mut writer, output)?;
    writer.finalize()?;
    debug!(path = %path.as_ref().display(), "wav written");
    Ok(())
}
