//! Audio Buffer Management
//!
//! Provides the core audio buffer type and level helpers for Hearthtone.
//! All synthesis happens in mono 32-bit float at a single sample rate per run.

use crate::error::{HearthError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default sample rate for synthesis (44.1kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Lowest sample rate accepted for synthesis
///
/// Below this the noise filters (up to 3 kHz) and the shortest percussive
/// hits no longer fit in the signal.
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Maximum render length in seconds (10 minutes)
pub const MAX_DURATION_SECS: f64 = 600.0;

/// Largest absolute sample value the output format can represent
pub const FULL_SCALE: f32 = 1.0;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Number of samples covering `duration_secs` at `sample_rate`
///
/// Rounds to the nearest integer sample. Non-positive or non-finite
/// durations and sample rates below [`MIN_SAMPLE_RATE`] are rejected
/// rather than clamped.
///
/// # Errors
/// * `InvalidParameter` - duration <= 0, not finite, or above [`MAX_DURATION_SECS`];
///   sample rate below [`MIN_SAMPLE_RATE`]
pub fn sample_count(duration_secs: f64, sample_rate: u32) -> Result<usize> {
    if sample_rate < MIN_SAMPLE_RATE {
        return Err(HearthError::invalid(
            "sample_rate",
            sample_rate,
            format!("at least {} Hz", MIN_SAMPLE_RATE),
        ));
    }
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(HearthError::invalid(
            "duration_secs",
            duration_secs,
            "a positive number of seconds",
        ));
    }
    if duration_secs > MAX_DURATION_SECS {
        return Err(HearthError::invalid(
            "duration_secs",
            duration_secs,
            format!("at most {} seconds", MAX_DURATION_SECS),
        ));
    }

    Ok((duration_secs * sample_rate as f64).round() as usize)
}

/// Largest absolute difference between adjacent samples in `samples`
///
/// Used to detect clicks: a step far above the signal's natural slope
/// is heard as a discontinuity.
pub fn max_step(samples: &[f32]) -> f32 {
    samples
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .fold(0.0_f32, f32::max)
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Mono audio buffer used by every stage of the pipeline
///
/// # Example
/// ```
/// use hearthtone::engine::buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};
///
/// // Create a 1-second silent buffer
/// let buffer = AudioBuffer::new(DEFAULT_SAMPLE_RATE as usize, DEFAULT_SAMPLE_RATE);
/// assert_eq!(buffer.channels(), 1);
/// assert_eq!(buffer.len(), 44100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given number of samples
    pub fn new(num_samples: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![0.0_f32; num_samples],
            sample_rate,
        }
    }

    /// Wrap existing sample data
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Sample data
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Mutable sample data
    #[inline]
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Consume the buffer, returning its samples
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels (always mono)
    #[inline]
    pub fn channels(&self) -> usize {
        1
    }

    /// Number of samples
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer has no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Peak absolute amplitude (linear)
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    /// Sum of squared samples
    pub fn energy(&self) -> f64 {
        self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum()
    }

    /// Root mean square level (linear). Zero for empty buffers.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        (self.energy() / self.samples.len() as f64).sqrt() as f32
    }

    /// RMS level in dBFS
    pub fn rms_db(&self) -> f32 {
        linear_to_db(self.rms())
    }

    /// Peak level in dBFS
    pub fn peak_db(&self) -> f32 {
        linear_to_db(self.peak())
    }

    /// Check all samples are finite (no NaN/Inf)
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    /// Multiply every sample by a linear gain
    pub fn apply_gain(&mut self, gain: f32) {
        for sample in self.samples.iter_mut() {
            *sample *= gain;
        }
    }

    /// Scale so the peak equals `target_peak`. Silent buffers are left untouched.
    pub fn normalize_to(&mut self, target_peak: f32) {
        let peak = self.peak();
        if peak > 0.0 {
            self.apply_gain(target_peak / peak);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
