//! Chimes: sparse bell tones that ring out and decay

use super::{cycle_starts, mix_into, secs_to_samples, SynthParams};
use crate::dsp::{render_tone, Envelope, Partial};
use crate::error::Result;

/// Bell-like partial stack
const CHIME_PARTIALS: [Partial; 4] = [
    Partial::sine(1.0, 1.0),
    Partial::sine(2.0, 0.5),
    Partial::sine(3.0, 0.2),
    Partial::sine(4.0, 0.1),
];

/// Rate of the soft onset, 1 - e^(-8t)
const ATTACK_RATE: f64 = 8.0;
/// Rate of the exponential ring-out, e^(-1.2t)
const DECAY_RATE: f64 = 1.2;
/// Linear ramp at each end of a note segment
const EDGE_FADE_SECS: f64 = 0.005;

pub(super) fn render(params: &SynthParams<'_>, num_samples: usize) -> Result<Vec<f32>> {
    let palette = params.palette;
    let sr = params.sample_rate;
    let beat = palette.beat_secs();
    let mut out = vec![0.0_f32; num_samples];

    for cycle in cycle_starts(params.duration_secs, palette.phrase_secs()) {
        for note in &palette.chimes {
            let start = secs_to_samples(cycle + note.onset_beats * beat, sr);
            let len = secs_to_samples(note.length_beats * beat, sr);
            if start >= num_samples || len == 0 {
                continue;
            }

            let mut tone = render_tone(palette.scale_frequency(note.degree), &CHIME_PARTIALS, len, sr);
            for (i, s) in tone.iter_mut().enumerate() {
                let t = i as f64 / sr as f64;
                let strike = (1.0 - (-t * ATTACK_RATE).exp()) * (-t * DECAY_RATE).exp();
                *s *= strike as f32 * note.velocity;
            }
            Envelope::fade(len as f64 / sr as f64, EDGE_FADE_SECS, EDGE_FADE_SECS)?
                .apply_in_place(&mut tone, sr)?;
            mix_into(&mut out, start, &tone);
        }
    }

    Ok(out)
}
