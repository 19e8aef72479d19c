//! Loop Fitter
//!
//! Reconciles the mixed buffer with the silent video's length. A buffer at
//! least as long as the target is truncated; a shorter one is repeated from
//! its start with an equal-power crossfade at every seam. Both branches
//! finish with a raised-cosine fade so the final sample lands on silence.

use std::f64::consts::{FRAC_PI_2, PI};

use serde::Serialize;

use crate::engine::buffer::sample_count;
use crate::engine::{AudioBuffer, FULL_SCALE};
use crate::error::{HearthError, Result};

/// Crossfade window at each loop seam
pub const DEFAULT_CROSSFADE_SECS: f64 = 0.1;
/// Fade-out over the end of the fitted buffer
pub const DEFAULT_TAIL_FADE_SECS: f64 = 0.25;

/// Crossfaded region `[start, end)` in the fitted output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Seam {
    pub start: usize,
    pub end: usize,
}

impl Seam {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Fitted buffer and where its seams are
#[derive(Debug, Clone)]
pub struct FittedBuffer {
    buffer: AudioBuffer,
    seams: Vec<Seam>,
    truncated: bool,
}

impl FittedBuffer {
    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> AudioBuffer {
        self.buffer
    }

    /// Seams in output order; empty when the source was only truncated
    pub fn seams(&self) -> &[Seam] {
        &self.seams
    }

    /// True when the source was long enough to be cut down rather than looped
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopFitter {
    crossfade_secs: f64,
    tail_fade_secs: f64,
}

impl Default for LoopFitter {
    fn default() -> Self {
        Self {
            crossfade_secs: DEFAULT_CROSSFADE_SECS,
            tail_fade_secs: DEFAULT_TAIL_FADE_SECS,
        }
    }
}

impl LoopFitter {
    /// # Errors
    /// * `InvalidParameter` - a negative or non-finite window
    pub fn new(crossfade_secs: f64, tail_fade_secs: f64) -> Result<Self> {
        for (param, value) in [("crossfade_secs", crossfade_secs), ("tail_fade_secs", tail_fade_secs)] {
            if !value.is_finite() || value < 0.0 {
                return Err(HearthError::invalid(param, value, "a finite time >= 0 s"));
            }
        }
        Ok(Self {
            crossfade_secs,
            tail_fade_secs,
        })
    }

    pub fn crossfade_secs(&self) -> f64 {
        self.crossfade_secs
    }

    pub fn tail_fade_secs(&self) -> f64 {
        self.tail_fade_secs
    }

    /// Fit `source` to exactly `round(target_secs * sample_rate)` samples
    ///
    /// # Arguments
    /// * `source` - The mixed buffer
    /// * `target_secs` - Length of the silent video
    ///
    /// # Errors
    /// * `InvalidParameter` - empty source, or a target that is not positive
    ///   or rounds to zero samples
    pub fn fit(&self, source: &AudioBuffer, target_secs: f64) -> Result<FittedBuffer> {
        let sr = source.sample_rate();
        let target_len = sample_count(target_secs, sr)?;
        if target_len == 0 {
            return Err(HearthError::invalid(
                "target_duration_secs",
                target_secs,
                format!("at least one sample at {} Hz", sr),
            ));
        }
        if source.is_empty() {
            return Err(HearthError::invalid("source", "empty buffer", "at least one sample"));
        }

        let src = source.samples();
        let truncated = src.len() >= target_len;
        let mut seams = Vec::new();

        let mut out = if truncated {
            src[..target_len].to_vec()
        } else {
            let window = self.crossfade_len(src.len(), sr);
            let mut out = Vec::with_capacity(target_len + src.len());
            out.extend_from_slice(src);

            while out.len() < target_len {
                let seam_start = out.len() - window;
                crossfade_into(&mut out[seam_start..], &src[..window]);
                seams.push(Seam {
                    start: seam_start,
                    end: out.len(),
                });
                out.extend_from_slice(&src[window..]);
            }
            out.truncate(target_len);
            seams.retain(|seam| seam.start < target_len);
            for seam in &mut seams {
                seam.end = seam.end.min(target_len);
            }
            out
        };

        let tail = secs_to_len(self.tail_fade_secs, sr).min(out.len());
        fade_out_tail(&mut out, tail);

        let mut buffer = AudioBuffer::from_samples(out, sr);
        // Correlated material can sum above full scale inside an equal-power seam
        if buffer.peak() > FULL_SCALE {
            log::warn!("Loop seams peaked at {:.3}; rescaling to full scale", buffer.peak());
            buffer.normalize_to(FULL_SCALE);
        }

        log::debug!(
            "Fitted {} samples to {} ({}, {} seams)",
            src.len(),
            target_len,
            if truncated { "truncated" } else { "looped" },
            seams.len()
        );

        Ok(FittedBuffer {
            buffer,
            seams,
            truncated,
        })
    }

    /// Crossfade length in samples, never more than half the source
    fn crossfade_len(&self, source_len: usize, sample_rate: u32) -> usize {
        secs_to_len(self.crossfade_secs, sample_rate).min(source_len / 2)
    }
}

fn secs_to_len(secs: f64, sample_rate: u32) -> usize {
    (secs * sample_rate as f64).round() as usize
}

/// Equal-power blend: `tail` fades out with cos, `head` fades in with sin
fn crossfade_into(tail: &mut [f32], head: &[f32]) {
    let window = tail.len();
    for (j, (t, &h)) in tail.iter_mut().zip(head).enumerate() {
        let theta = j as f64 / window as f64 * FRAC_PI_2;
        *t = (*t as f64 * theta.cos() + h as f64 * theta.sin()) as f32;
    }
}

/// Raised-cosine fade over the last `len` samples, reaching zero on the final one
fn fade_out_tail(samples: &mut [f32], len: usize) {
    if len == 0 {
        return;
    }
    let start = samples.len() - len;
    for (k, s) in samples[start..].iter_mut().enumerate() {
        let gain = 0.5 * (1.0 + (PI * (k + 1) as f64 / len as f64).cos());
        *s *= gain as f32;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::CLICK_THRESHOLD;
    use crate::engine::buffer::max_step;
    use approx::assert_relative_eq;
    use test_case::test_case;

    fn sine(freq: f64, secs: f64, sr: u32, amp: f32) -> AudioBuffer {
        let n = (secs * sr as f64).round() as usize;
        let samples = (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / sr as f64).sin() as f32)
            .collect();
        AudioBuffer::from_samples(samples, sr)
    }

    #[test_case(5.0, 6.0 ; "extend five to six")]
    #[test_case(6.0, 6.0 ; "exact")]
    #[test_case(8.0, 6.0 ; "truncate")]
    #[test_case(1.0, 6.37 ; "many seams")]
    #[test_case(0.3, 0.05 ; "short target")]
    fn test_output_length_is_exact(source_secs: f64, target_secs: f64) {
        let sr = 44100;
        let fitted = LoopFitter::default()
            .fit(&sine(220.0, source_secs, sr, 0.5), target_secs)
            .unwrap();
        let expected = (target_secs * sr as f64).round() as usize;
        assert_eq!(fitted.buffer().len(), expected);
        assert_eq!(fitted.truncated(), source_secs >= target_secs);
    }

    #[test]
    fn test_five_seconds_looped_to_six() {
        let sr = 44100;
        let fitted = LoopFitter::default().fit(&sine(220.0, 5.0, sr, 0.5), 6.0).unwrap();

        assert_eq!(fitted.buffer().len(), 264600);
        assert_eq!(fitted.seams(), &[Seam { start: 216090, end: 220500 }]);
        assert!(!fitted.truncated());
    }

    #[test]
    fn test_seam_has_no_click() {
        // 2.35 Hz over 5 s ends half a cycle away from where it starts
        let sr = 44100;
        let source = sine(2.35, 5.0, sr, 0.8);
        let fitted = LoopFitter::default().fit(&source, 12.0).unwrap();
        assert_eq!(fitted.seams().len(), 2);

        let own_slope = max_step(source.samples());
        for seam in fitted.seams() {
            let region = &fitted.buffer().samples()[seam.start - 1..seam.end + 1];
            assert!(max_step(region) <= own_slope + CLICK_THRESHOLD);
        }
    }

    #[test]
    fn test_naive_repeat_would_click() {
        let source = sine(2.35, 5.0, 44100, 0.8);
        let samples = source.samples();
        let jump = (samples[0] - samples[samples.len() - 1]).abs();
        assert!(jump > CLICK_THRESHOLD);
    }

    #[test]
    fn test_tail_ends_silent() {
        let fitted = LoopFitter::default().fit(&sine(220.0, 8.0, 8000, 0.5), 6.0).unwrap();
        let samples = fitted.buffer().samples();
        assert_eq!(samples[samples.len() - 1], 0.0);
        // Audio before the tail fade is untouched
        let before = samples.len() - secs_to_len(DEFAULT_TAIL_FADE_SECS, 8000) - 1;
        let expected = 0.5 * (2.0 * PI * 220.0 * before as f64 / 8000.0).sin() as f32;
        assert_relative_eq!(samples[before], expected, epsilon = 1e-6);
    }

    #[test]
    fn test_crossfade_clamped_for_tiny_sources() {
        let source = AudioBuffer::from_samples(vec![0.25; 100], 44100);
        let fitted = LoopFitter::default().fit(&source, 0.01).unwrap();
        assert_eq!(fitted.buffer().len(), 441);
        assert_eq!(fitted.seams()[0], Seam { start: 50, end: 100 });
        assert!(fitted.seams().iter().all(|seam| seam.len() <= 50 && seam.end <= 441));
        assert!(fitted.buffer().peak() <= FULL_SCALE);
    }

    #[test]
    fn test_rejects_degenerate_inputs() {
        let fitter = LoopFitter::default();
        let source = sine(220.0, 1.0, 8000, 0.5);
        assert_eq!(fitter.fit(&source, 0.0).unwrap_err().error_code(), "INVALID_PARAMETER");
        assert!(fitter.fit(&source, -2.0).is_err());
        assert!(fitter.fit(&source, 1e-6).is_err());
        assert!(fitter.fit(&AudioBuffer::new(0, 8000), 1.0).is_err());
        assert!(LoopFitter::new(-0.1, 0.25).is_err());
    }
}
