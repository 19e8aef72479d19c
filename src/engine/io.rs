//! Audio file I/O for Hearthtone
//!
//! Rendered tracks and layers are written as WAV. Import exists so rendered
//! files can be analyzed and verified; multi-channel files are reduced to
//! their first channel.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;
use crate::error::{HearthError, Result};

/// Export format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportFormat {
    /// Bit depth: 16, 24, or 32 (32 = float)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat { bit_depth: 16 }
    }
}

impl ExportFormat {
    /// Create a new export format with the given bit depth
    pub fn new(bit_depth: u16) -> Self {
        ExportFormat { bit_depth }
    }

    /// 16-bit PCM, what the muxing tool re-encodes from
    pub fn pcm16() -> Self {
        ExportFormat { bit_depth: 16 }
    }

    /// 32-bit float, lossless for intermediate files
    pub fn float32() -> Self {
        ExportFormat { bit_depth: 32 }
    }

    fn spec(&self, sample_rate: u32) -> Result<WavSpec> {
        let sample_format = match self.bit_depth {
            16 | 24 => SampleFormat::Int,
            32 => SampleFormat::Float,
            other => {
                return Err(HearthError::invalid(
                    "bit_depth",
                    other,
                    "16, 24 or 32",
                ))
            }
        };
        Ok(WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format,
        })
    }
}

/// Export a buffer to a mono WAV file
///
/// Samples are clamped to full scale during integer quantization.
///
/// # Errors
/// * `InvalidParameter` - unsupported bit depth
/// * `Wav` - the file cannot be created or written
pub fn export_wav(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let spec = format.spec(buffer.sample_rate())?;
    let mut writer = WavWriter::create(path, spec)?;

    match format.bit_depth {
        16 => {
            for &sample in buffer.samples() {
                let scaled = (sample * 32767.0).round().clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled)?;
            }
        }
        24 => {
            for &sample in buffer.samples() {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).round().clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled)?;
            }
        }
        _ => {
            for &sample in buffer.samples() {
                writer.write_sample(sample)?;
            }
        }
    }

    writer.finalize()?;
    log::debug!(
        "Wrote {} samples ({}-bit) to {}",
        buffer.len(),
        format.bit_depth,
        path.display()
    );
    Ok(())
}

/// Import a WAV file as a mono buffer
///
/// # Errors
/// * `FileNotFound` - the file does not exist
/// * `Wav` - the file is not a readable WAV file
/// * `InvalidParameter` - unsupported integer bit depth
pub fn import_wav(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(HearthError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()?,
        SampleFormat::Int => {
            let scale = match spec.bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                other => {
                    return Err(HearthError::invalid(
                        "bits_per_sample",
                        other,
                        "8, 16, 24 or 32",
                    ))
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()?
        }
    };

    let samples = interleaved.iter().step_by(channels).copied().collect();
    Ok(AudioBuffer::from_samples(samples, spec.sample_rate))
}

// ============================================================================
// Tests
// ============================================================================
