//! Oscillators and additive tones

use std::f64::consts::TAU;

/// Basic periodic waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
}

impl Waveform {
    /// Value at `phase` measured in cycles
    #[inline]
    pub fn at(&self, phase: f64) -> f64 {
        match self {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Triangle => {
                let p = phase.rem_euclid(1.0);
                // Starts at 0 like sine, peaks at 0.25 cycles
                if p < 0.25 {
                    4.0 * p
                } else if p < 0.75 {
                    2.0 - 4.0 * p
                } else {
                    4.0 * p - 4.0
                }
            }
        }
    }
}

/// One component of an additive tone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partial {
    /// Multiple of the fundamental
    pub ratio: f64,
    pub weight: f64,
    pub waveform: Waveform,
}

impl Partial {
    pub const fn sine(ratio: f64, weight: f64) -> Self {
        Self {
            ratio,
            weight,
            waveform: Waveform::Sine,
        }
    }

    pub const fn triangle(ratio: f64, weight: f64) -> Self {
        Self {
            ratio,
            weight,
            waveform: Waveform::Triangle,
        }
    }
}

/// Sum of partials of `frequency` at time `t`
#[inline]
pub fn additive(frequency: f64, t: f64, partials: &[Partial]) -> f64 {
    partials
        .iter()
        .map(|p| p.weight * p.waveform.at(frequency * p.ratio * t))
        .sum()
}

/// Render `num_samples` of an additive tone starting at phase zero
pub fn render_tone(
    frequency: f64,
    partials: &[Partial],
    num_samples: usize,
    sample_rate: u32,
) -> Vec<f32> {
    let sr = sample_rate as f64;
    (0..num_samples)
        .map(|i| additive(frequency, i as f64 / sr, partials) as f32)
        .collect()
}

/// Equal-tempered frequency `semitones` away from `base_hz`
#[inline]
pub fn transpose(base_hz: f64, semitones: f64) -> f64 {
    base_hz * 2.0_f64.powf(semitones / 12.0)
}
