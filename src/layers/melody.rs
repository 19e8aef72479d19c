//! Melody: the palette's phrase as soft piano-like tones, repeated every phrase

use super::{cycle_starts, mix_into, secs_to_samples, SynthParams};
use crate::dsp::{render_tone, Adsr, Envelope, Partial};
use crate::error::Result;

/// Pure sine with gentle upper harmonics
const MELODY_PARTIALS: [Partial; 3] = [
    Partial::sine(1.0, 1.0),
    Partial::sine(2.0, 0.3),
    Partial::sine(3.0, 0.1),
];

/// Soft attack, full sustain, gentle release
const NOTE_SHAPE: Adsr = Adsr {
    attack_secs: 0.1,
    decay_secs: 0.0,
    sustain_level: 1.0,
    release_secs: 0.5,
};

pub(super) fn render(params: &SynthParams<'_>, num_samples: usize) -> Result<Vec<f32>> {
    let palette = params.palette;
    let sr = params.sample_rate;
    let beat = palette.beat_secs();
    let mut out = vec![0.0_f32; num_samples];

    for cycle in cycle_starts(params.duration_secs, palette.phrase_secs()) {
        for note in &palette.melody {
            let onset = cycle + note.onset_beats * beat;
            let start = secs_to_samples(onset, sr);
            let len = secs_to_samples(note.length_beats * beat, sr);
            if start >= num_samples || len == 0 {
                continue;
            }

            let mut tone = render_tone(palette.scale_frequency(note.degree), &MELODY_PARTIALS, len, sr);
            Envelope::adsr(NOTE_SHAPE, len as f64 / sr as f64)?.apply_in_place(&mut tone, sr)?;
            for s in tone.iter_mut() {
                *s *= note.velocity;
            }
            mix_into(&mut out, start, &tone);
        }
    }

    Ok(out)
}
