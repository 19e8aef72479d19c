//! Warm pad: the chord held under everything else

use std::f64::consts::TAU;

use super::SynthParams;
use crate::dsp::{additive, Envelope, Partial};
use crate::error::Result;

/// Sine fundamental with a soft triangle an octave up
const PAD_PARTIALS: [Partial; 2] = [Partial::sine(1.0, 1.0), Partial::triangle(2.0, 0.3)];

/// Slow breathing swell: 0.85 +/- 0.15 at 0.05 Hz
const SWELL_RATE_HZ: f64 = 0.05;
const SWELL_DEPTH: f64 = 0.15;

const MAX_FADE_SECS: f64 = 2.0;
const FADE_FRACTION: f64 = 0.25;

pub(super) fn render(params: &SynthParams<'_>, num_samples: usize) -> Result<Vec<f32>> {
    let sr = params.sample_rate as f64;
    let chord = params.palette.chord_frequencies();

    let mut samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f64 / sr;
            // Lower chord tones carry more weight
            let tone: f64 = chord
                .iter()
                .enumerate()
                .map(|(k, &freq)| additive(freq, t, &PAD_PARTIALS) / (k + 1) as f64)
                .sum();
            let swell = 1.0 - SWELL_DEPTH + SWELL_DEPTH * (TAU * SWELL_RATE_HZ * t).sin();
            (tone * swell) as f32
        })
        .collect();

    let length_secs = num_samples as f64 / sr;
    let fade = (length_secs * FADE_FRACTION).min(MAX_FADE_SECS);
    Envelope::fade(length_secs, fade, fade)?.apply_in_place(&mut samples, params.sample_rate)?;

    Ok(samples)
}
