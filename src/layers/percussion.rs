//! Percussive one-shots placed at the palette's fixed timestamps
//!
//! Both patterns repeat once per phrase so they line up with the melody
//! when the track runs longer than one cycle.

use std::f64::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::Rng;

use super::{cycle_starts, mix_into, secs_to_samples, SynthParams};
use crate::dsp::{Adsr, Biquad, Envelope};
use crate::error::Result;

// Gobble: a warbling, fluttering call
const GOBBLE_SECS: f64 = 0.45;
const GOBBLE_BASE_HZ: f64 = 420.0;
const GOBBLE_VIBRATO_HZ: f64 = 18.0;
const GOBBLE_VIBRATO_DEPTH_HZ: f64 = 80.0;
/// Flutter is |sin(9 pi t)|
const GOBBLE_FLUTTER_RATE: f64 = 9.0;
const GOBBLE_SHAPE: Adsr = Adsr {
    attack_secs: 0.005,
    decay_secs: 0.05,
    sustain_level: 0.7,
    release_secs: 0.1,
};

// Footsteps: a muffled thump
const STEP_SECS: f64 = 0.12;
const STEP_LOW_PASS_HZ: f64 = 400.0;
const STEP_BODY_HZ: f64 = 90.0;
const STEP_BODY_LEVEL: f32 = 0.6;
const STEP_DECAY_RATE: f64 = 35.0;

fn onsets<'a>(params: &SynthParams<'_>, times: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
    let duration_secs = params.duration_secs;
    cycle_starts(duration_secs, params.palette.phrase_secs())
        .flat_map(move |cycle| times.iter().map(move |&t| cycle + t))
        .filter(move |&t| t < duration_secs)
}

fn gobble_call(sample_rate: u32) -> Result<Vec<f32>> {
    let len = secs_to_samples(GOBBLE_SECS, sample_rate);
    let dt = 1.0 / sample_rate as f64;

    // Accumulate phase so the vibrato bends pitch without discontinuities
    let mut phase = 0.0_f64;
    let mut call: Vec<f32> = (0..len)
        .map(|i| {
            let t = i as f64 * dt;
            let freq =
                GOBBLE_BASE_HZ + GOBBLE_VIBRATO_DEPTH_HZ * (TAU * GOBBLE_VIBRATO_HZ * t).sin();
            let value = (TAU * phase).sin() + 0.35 * (2.0 * TAU * phase).sin();
            phase = (phase + freq * dt).fract();
            let flutter = (GOBBLE_FLUTTER_RATE * PI * t).sin().abs();
            (value * flutter) as f32
        })
        .collect();

    Envelope::adsr(GOBBLE_SHAPE, len as f64 / sample_rate as f64)?
        .apply_in_place(&mut call, sample_rate)?;
    Ok(call)
}

pub(super) fn gobble(params: &SynthParams<'_>, num_samples: usize) -> Result<Vec<f32>> {
    let sr = params.sample_rate;
    let call = gobble_call(sr)?;
    let mut out = vec![0.0_f32; num_samples];

    for onset in onsets(params, &params.palette.gobble_times_secs) {
        mix_into(&mut out, secs_to_samples(onset, sr), &call);
    }

    Ok(out)
}

/// Each step draws fresh noise so repeated steps do not sound identical
pub(super) fn footsteps(
    params: &SynthParams<'_>,
    num_samples: usize,
    rng: &mut StdRng,
) -> Result<Vec<f32>> {
    let sr = params.sample_rate;
    let step_len = secs_to_samples(STEP_SECS, sr);
    let step_env = Envelope::fade(step_len as f64 / sr as f64, 0.002, 0.02)?;
    let mut out = vec![0.0_f32; num_samples];

    for onset in onsets(params, &params.palette.footstep_times_secs) {
        let mut step: Vec<f32> = (0..step_len).map(|_| rng.gen_range(-1.0_f32..1.0)).collect();
        Biquad::low_pass(sr, STEP_LOW_PASS_HZ).process_slice(&mut step);

        for (i, s) in step.iter_mut().enumerate() {
            let t = i as f64 / sr as f64;
            let body = STEP_BODY_LEVEL * (TAU * STEP_BODY_HZ * t).sin() as f32;
            *s = (*s + body) * (-t * STEP_DECAY_RATE).exp() as f32;
        }
        step_env.apply_in_place(&mut step, sr)?;
        mix_into(&mut out, secs_to_samples(onset, sr), &step);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Palette;
    use crate::dsp::CLICK_THRESHOLD;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn test_gobble_call_starts_and_ends_silent() {
        let call = gobble_call(44100).unwrap();
        assert_eq!(call.len(), secs_to_samples(GOBBLE_SECS, 44100));
        assert!(call[0].abs() <= CLICK_THRESHOLD);
        assert!(call[call.len() - 1].abs() <= CLICK_THRESHOLD);
    }

    #[test]
    fn test_onsets_repeat_each_phrase() {
        let palette = Palette::default();
        let params = SynthParams::new(13.0, 8000, &palette, 0);
        let times: Vec<f64> = onsets(&params, &palette.gobble_times_secs).collect();
        assert_eq!(times.len(), 4);
        for (got, want) in times.iter().zip([1.2, 4.1, 7.2, 10.1]) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_silence_before_first_step() {
        let palette = Palette::default();
        let params = SynthParams::new(1.0, 8000, &palette, 0);
        let mut rng = StdRng::seed_from_u64(7);
        let out = footsteps(&params, 8000, &mut rng).unwrap();
        let first = secs_to_samples(0.3, 8000);
        assert!(out[..first].iter().all(|&s| s == 0.0));
        assert!(out[first..].iter().any(|&s| s != 0.0));
    }
}
