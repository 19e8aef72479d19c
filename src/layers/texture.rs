//! Noise textures: wind, rustling leaves and a crackling fireplace
//!
//! All randomness comes from the seeded generator handed in by
//! [`LayerKind::generate`](super::LayerKind::generate), so a texture is
//! reproducible for a given run seed.

use std::f64::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::Rng;

use super::{mix_into, secs_to_samples, SynthParams};
use crate::dsp::{Biquad, Envelope};
use crate::error::Result;

/// Fade applied to continuous textures at both ends
const TEXTURE_FADE_SECS: f64 = 0.5;

// Wind
const WIND_LOW_PASS_HZ: f64 = 800.0;
const WIND_HIGH_PASS_HZ: f64 = 100.0;
const WIND_GUST_RATE_HZ: f64 = 0.15;

// Leaves
const RUSTLE_SECS: f64 = 0.8;
const RUSTLE_SPACING_SECS: f64 = 1.5;
const RUSTLE_HIGH_PASS_HZ: f64 = 2000.0;
const RUSTLE_DECAY_RATE: f64 = 4.0;

// Fireplace
const HUM_PARTIALS: [(f64, f64); 2] = [(120.0, 0.05), (180.0, 0.03)];
const HUM_SWELL_RATE_HZ: f64 = 0.05;
const CRACKLES_PER_SEC: f64 = 1.25;
const CRACKLE_SECS: f64 = 0.15;
const CRACKLE_BAND_HZ: (f64, f64) = (500.0, 3000.0);
const CRACKLE_DECAY_RATE: f64 = 30.0;
const CRACKLE_LEVEL: f32 = 0.04;

fn white_noise(rng: &mut StdRng, num_samples: usize) -> Vec<f32> {
    (0..num_samples).map(|_| rng.gen_range(-1.0_f32..1.0)).collect()
}

fn fade_edges(samples: &mut [f32], sample_rate: u32) -> Result<()> {
    let length_secs = samples.len() as f64 / sample_rate as f64;
    let fade = TEXTURE_FADE_SECS.min(length_secs * 0.25);
    Envelope::fade(length_secs, fade, fade)?.apply_in_place(samples, sample_rate)
}

/// Gentle band-limited whoosh with slow gusts
pub(super) fn wind(
    params: &SynthParams<'_>,
    num_samples: usize,
    rng: &mut StdRng,
) -> Result<Vec<f32>> {
    let sr = params.sample_rate;
    let mut samples = white_noise(rng, num_samples);

    Biquad::low_pass(sr, WIND_LOW_PASS_HZ).process_slice(&mut samples);
    Biquad::high_pass(sr, WIND_HIGH_PASS_HZ).process_slice(&mut samples);

    for (i, s) in samples.iter_mut().enumerate() {
        let t = i as f64 / sr as f64;
        let gust = 0.3 + 0.2 * (TAU * WIND_GUST_RATE_HZ * t).sin();
        *s *= gust as f32;
    }

    fade_edges(&mut samples, sr)?;
    Ok(samples)
}

/// Crinkly high-passed noise bursts at roughly regular, jittered intervals
pub(super) fn leaves(
    params: &SynthParams<'_>,
    num_samples: usize,
    rng: &mut StdRng,
) -> Result<Vec<f32>> {
    let sr = params.sample_rate;
    let burst_len = secs_to_samples(RUSTLE_SECS, sr);
    let mut out = vec![0.0_f32; num_samples];

    for i in 0.. {
        let onset = i as f64 * RUSTLE_SPACING_SECS + rng.gen::<f64>();
        if onset >= params.duration_secs {
            break;
        }

        let mut burst = white_noise(rng, burst_len);
        Biquad::high_pass(sr, RUSTLE_HIGH_PASS_HZ).process_slice(&mut burst);
        for (j, s) in burst.iter_mut().enumerate() {
            let t = j as f64 / sr as f64;
            // Rises from and returns to zero across the burst
            let env = (-t * RUSTLE_DECAY_RATE).exp() * (PI * t / RUSTLE_SECS).sin();
            *s *= env as f32;
        }
        mix_into(&mut out, secs_to_samples(onset, sr), &burst);
    }

    Ok(out)
}

/// Low room hum with scattered band-passed crackles
pub(super) fn fireplace(
    params: &SynthParams<'_>,
    num_samples: usize,
    rng: &mut StdRng,
) -> Result<Vec<f32>> {
    let sr = params.sample_rate;
    let mut out: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f64 / sr as f64;
            let hum: f64 = HUM_PARTIALS
                .iter()
                .map(|&(freq, level)| level * (TAU * freq * t).sin())
                .sum();
            (hum * (1.0 + 0.3 * (TAU * HUM_SWELL_RATE_HZ * t).sin())) as f32
        })
        .collect();
    fade_edges(&mut out, sr)?;

    let crackle_len = secs_to_samples(CRACKLE_SECS, sr);
    let count = (params.duration_secs * CRACKLES_PER_SEC).ceil() as usize;
    for _ in 0..count {
        let onset = rng.gen::<f64>() * params.duration_secs;
        let mut crackle = white_noise(rng, crackle_len);
        Biquad::band_pass(sr, CRACKLE_BAND_HZ.0, CRACKLE_BAND_HZ.1).process_slice(&mut crackle);
        for (j, s) in crackle.iter_mut().enumerate() {
            let t = j as f64 / sr as f64;
            *s *= (-t * CRACKLE_DECAY_RATE).exp() as f32 * CRACKLE_LEVEL;
        }
        // Sharp but not instantaneous onset
        Envelope::fade(crackle_len as f64 / sr as f64, 0.002, 0.01)?
            .apply_in_place(&mut crackle, sr)?;
        mix_into(&mut out, secs_to_samples(onset, sr), &crackle);
    }

    Ok(out)
}
