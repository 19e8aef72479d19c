//! Envelope Shaper
//!
//! Piecewise-linear amplitude envelopes applied multiplicatively to a whole
//! buffer or to a single note segment. Envelopes built by [`Envelope::adsr`]
//! and [`Envelope::fade`] start and end at zero, so a shaped segment can be
//! dropped into silence without a click.

use serde::{Deserialize, Serialize};

use crate::engine::AudioBuffer;
use crate::error::{HearthError, Result};

/// Largest amplitude jump tolerated at a segment boundary or loop seam
pub const CLICK_THRESHOLD: f32 = 0.05;

/// Slack when checking that an envelope spans a segment
const COVERAGE_EPSILON: f64 = 1e-9;

/// One (time, amplitude) control point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub time_secs: f64,
    pub amplitude: f32,
}

impl ControlPoint {
    pub fn new(time_secs: f64, amplitude: f32) -> Self {
        Self {
            time_secs,
            amplitude,
        }
    }
}

/// Attack/decay/sustain/release shape in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    pub attack_secs: f64,
    pub decay_secs: f64,
    /// Sustain level relative to the attack peak (0.0 to 1.0)
    pub sustain_level: f32,
    pub release_secs: f64,
}

impl Adsr {
    pub fn new(attack_secs: f64, decay_secs: f64, sustain_level: f32, release_secs: f64) -> Self {
        Self {
            attack_secs,
            decay_secs,
            sustain_level,
            release_secs,
        }
    }

    /// Attack then release with no decay stage
    pub fn attack_release(attack_secs: f64, release_secs: f64) -> Self {
        Self::new(attack_secs, 0.0, 1.0, release_secs)
    }

    /// Shrink the timed stages proportionally so they fit in `length_secs`
    fn fitted_to(&self, length_secs: f64) -> Self {
        let total = self.attack_secs + self.decay_secs + self.release_secs;
        if total <= length_secs || total <= 0.0 {
            return *self;
        }
        let scale = length_secs / total;
        Self {
            attack_secs: self.attack_secs * scale,
            decay_secs: self.decay_secs * scale,
            sustain_level: self.sustain_level,
            release_secs: self.release_secs * scale,
        }
    }
}

/// Time-varying amplitude multiplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    points: Vec<ControlPoint>,
}

impl Envelope {
    /// Create an envelope from control points
    ///
    /// # Errors
    /// * `InvalidParameter` - no points, a negative or non-finite amplitude,
    ///   a negative or non-finite time, or times that go backwards
    pub fn new(points: Vec<ControlPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(HearthError::invalid(
                "envelope",
                "no control points",
                "at least one control point",
            ));
        }

        for (i, point) in points.iter().enumerate() {
            if !point.amplitude.is_finite() || point.amplitude < 0.0 {
                return Err(HearthError::invalid(
                    "envelope.amplitude",
                    point.amplitude,
                    "a finite non-negative amplitude",
                ));
            }
            if !point.time_secs.is_finite() || point.time_secs < 0.0 {
                return Err(HearthError::invalid(
                    "envelope.time_secs",
                    point.time_secs,
                    "a finite non-negative time",
                ));
            }
            if i > 0 && point.time_secs < points[i - 1].time_secs {
                return Err(HearthError::invalid(
                    "envelope.time_secs",
                    point.time_secs,
                    format!("at least {} (times must not decrease)", points[i - 1].time_secs),
                ));
            }
        }

        Ok(Self { points })
    }

    /// Create an envelope from `(time_secs, amplitude)` pairs
    pub fn from_pairs(pairs: &[(f64, f32)]) -> Result<Self> {
        Self::new(
            pairs
                .iter()
                .map(|&(t, a)| ControlPoint::new(t, a))
                .collect(),
        )
    }

    /// ADSR envelope spanning exactly `length_secs`
    ///
    /// Stages longer than the segment are shrunk proportionally; the
    /// envelope always starts and ends at zero.
    pub fn adsr(shape: Adsr, length_secs: f64) -> Result<Self> {
        if !length_secs.is_finite() || length_secs <= 0.0 {
            return Err(HearthError::invalid(
                "length_secs",
                length_secs,
                "a positive number of seconds",
            ));
        }
        if !(0.0..=1.0).contains(&shape.sustain_level) {
            return Err(HearthError::invalid(
                "sustain_level",
                shape.sustain_level,
                "0.0 to 1.0",
            ));
        }
        if shape.attack_secs < 0.0 || shape.decay_secs < 0.0 || shape.release_secs < 0.0 {
            return Err(HearthError::invalid(
                "adsr",
                format!("{:?}", shape),
                "non-negative stage times",
            ));
        }

        let s = shape.fitted_to(length_secs);
        let attack_end = s.attack_secs;
        let decay_end = attack_end + s.decay_secs;
        let release_start = (length_secs - s.release_secs).max(decay_end);

        Self::from_pairs(&[
            (0.0, 0.0),
            (attack_end, 1.0),
            (decay_end, s.sustain_level),
            (release_start, s.sustain_level),
            (length_secs, 0.0),
        ])
    }

    /// Linear fade in and fade out around a unity plateau
    pub fn fade(length_secs: f64, fade_in_secs: f64, fade_out_secs: f64) -> Result<Self> {
        Self::adsr(Adsr::attack_release(fade_in_secs, fade_out_secs), length_secs)
    }

    /// Control points in time order
    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// Time of the first control point
    pub fn start_secs(&self) -> f64 {
        self.points[0].time_secs
    }

    /// Time of the last control point
    pub fn end_secs(&self) -> f64 {
        self.points[self.points.len() - 1].time_secs
    }

    /// Check the envelope domain spans a segment of `num_samples`
    pub fn covers(&self, num_samples: usize, sample_rate: u32) -> bool {
        if num_samples == 0 {
            return true;
        }
        let last_sample_time = (num_samples - 1) as f64 / sample_rate as f64;
        self.start_secs() <= COVERAGE_EPSILON && self.end_secs() + COVERAGE_EPSILON >= last_sample_time
    }

    /// Check the envelope begins and ends quietly enough not to click
    pub fn is_click_free(&self) -> bool {
        self.points[0].amplitude <= CLICK_THRESHOLD
            && self.points[self.points.len() - 1].amplitude <= CLICK_THRESHOLD
    }

    /// Interpolated amplitude at `time_secs`
    ///
    /// Holds the first/last amplitude outside the control point range.
    pub fn value_at(&self, time_secs: f64) -> f32 {
        let idx = self.points.partition_point(|p| p.time_secs <= time_secs);
        if idx == 0 {
            return self.points[0].amplitude;
        }
        if idx == self.points.len() {
            return self.points[idx - 1].amplitude;
        }
        interpolate(&self.points[idx - 1], &self.points[idx], time_secs)
    }

    /// Shape a whole buffer, returning a new buffer of identical length
    pub fn apply(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        let mut shaped = buffer.clone();
        self.apply_in_place(shaped.samples_mut(), buffer.sample_rate())?;
        Ok(shaped)
    }

    /// Shape a segment in place; sample `i` sits at time `i / sample_rate`
    ///
    /// # Errors
    /// * `InvalidParameter` - the envelope domain does not cover the segment
    pub fn apply_in_place(&self, samples: &mut [f32], sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(HearthError::invalid("sample_rate", sample_rate, "> 0 Hz"));
        }
        if !self.covers(samples.len(), sample_rate) {
            return Err(HearthError::invalid(
                "envelope",
                format!("{:.4}s..{:.4}s", self.start_secs(), self.end_secs()),
                format!(
                    "a domain covering {:.4}s",
                    samples.len() as f64 / sample_rate as f64
                ),
            ));
        }

        // Walk the segments alongside the samples instead of searching per sample
        let mut segment = 0;
        for (i, sample) in samples.iter_mut().enumerate() {
            let t = i as f64 / sample_rate as f64;
            while segment + 1 < self.points.len() && self.points[segment + 1].time_secs <= t {
                segment += 1;
            }
            let gain = if segment + 1 < self.points.len() {
                interpolate(&self.points[segment], &self.points[segment + 1], t)
            } else {
                self.points[segment].amplitude
            };
            *sample *= gain;
        }

        Ok(())
    }
}

#[inline]
fn interpolate(p0: &ControlPoint, p1: &ControlPoint, t: f64) -> f32 {
    let span = p1.time_secs - p0.time_secs;
    if span <= 0.0 {
        return p1.amplitude;
    }
    let frac = ((t - p0.time_secs) / span).clamp(0.0, 1.0) as f32;
    p0.amplitude + (p1.amplitude - p0.amplitude) * frac
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rejects_negative_amplitude() {
        let err = Envelope::from_pairs(&[(0.0, 0.0), (1.0, -0.5)]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_rejects_decreasing_times() {
        assert!(Envelope::from_pairs(&[(0.0, 0.0), (1.0, 1.0), (0.5, 0.0)]).is_err());
        assert!(Envelope::new(Vec::new()).is_err());
    }

    #[test]
    fn test_linear_interpolation() {
        let env = Envelope::from_pairs(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.5)]).unwrap();
        assert_relative_eq!(env.value_at(0.0), 0.0);
        assert_relative_eq!(env.value_at(0.5), 0.5);
        assert_relative_eq!(env.value_at(1.0), 1.0);
        assert_relative_eq!(env.value_at(1.5), 0.75);
        assert_relative_eq!(env.value_at(5.0), 0.5);
    }

    #[test]
    fn test_apply_preserves_length() {
        let buffer = AudioBuffer::from_samples(vec![1.0; 100], 100);
        let env = Envelope::fade(1.0, 0.1, 0.1).unwrap();
        let shaped = env.apply(&buffer).unwrap();

        assert_eq!(shaped.len(), buffer.len());
        assert_eq!(shaped.samples()[0], 0.0);
        assert_relative_eq!(shaped.samples()[50], 1.0);
        // Source is untouched
        assert_eq!(buffer.samples()[0], 1.0);
    }

    #[test]
    fn test_apply_rejects_short_domain() {
        let buffer = AudioBuffer::from_samples(vec![1.0; 100], 100);
        let env = Envelope::from_pairs(&[(0.0, 0.0), (0.5, 1.0)]).unwrap();
        assert!(env.apply(&buffer).is_err());
    }

    #[test]
    fn test_adsr_shape() {
        let env = Envelope::adsr(Adsr::new(0.1, 0.2, 0.5, 0.3), 1.0).unwrap();
        assert_relative_eq!(env.value_at(0.0), 0.0);
        assert_relative_eq!(env.value_at(0.1), 1.0);
        assert_relative_eq!(env.value_at(0.3), 0.5);
        assert_relative_eq!(env.value_at(0.6), 0.5);
        assert_relative_eq!(env.value_at(1.0), 0.0);
        assert!(env.is_click_free());
    }

    #[test]
    fn test_adsr_stages_shrink_to_fit() {
        let env = Envelope::adsr(Adsr::attack_release(1.0, 1.0), 0.5).unwrap();
        assert_relative_eq!(env.end_secs(), 0.5);
        assert_relative_eq!(env.value_at(0.25), 1.0, epsilon = 1e-6);
        assert!(env.is_click_free());
    }

    #[test]
    fn test_shaped_segment_has_no_click_at_edges() {
        let sr = 44100;
        let n = 4410;
        let mut samples: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).cos())
            .collect();
        let env = Envelope::adsr(Adsr::new(0.01, 0.02, 0.7, 0.03), n as f64 / sr as f64).unwrap();
        env.apply_in_place(&mut samples, sr).unwrap();

        assert!(samples[0].abs() <= CLICK_THRESHOLD);
        assert!(samples[n - 1].abs() <= CLICK_THRESHOLD);
    }
}
