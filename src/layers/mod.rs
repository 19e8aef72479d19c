//! Layer Generators
//!
//! Each layer of the soundtrack is one variant of [`LayerKind`] and is
//! produced through the same entry point, [`LayerKind::generate`]:
//! - Pad: held chord of sine/triangle partials
//! - Chime: sparse decaying bell tones on the pentatonic scale
//! - Melody: a short phrase of enveloped tones, looping every phrase
//! - Wind, Leaves, Fireplace: shaped noise textures (seeded)
//! - Gobble, Footsteps: short percussive hits at fixed timestamps
//!
//! Generators are pure: the same [`SynthParams`] always produce the same
//! samples, and no layer is modified after it is created.

mod chime;
mod melody;
mod pad;
mod percussion;
mod texture;

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::Palette;
use crate::dsp::FilterChain;
use crate::engine::buffer::sample_count;
use crate::engine::AudioBuffer;
use crate::error::{HearthError, Result};

/// High-pass corner applied to every layer except the pad
pub const LOW_CUT_HZ: f64 = 200.0;

/// Broad family a layer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerFamily {
    Pad,
    Chime,
    Melody,
    Texture,
    Percussion,
}

/// Every layer the soundtrack can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Pad,
    Chime,
    Melody,
    Wind,
    Leaves,
    Fireplace,
    Gobble,
    Footsteps,
}

impl LayerKind {
    /// All layers in mix order
    pub const ALL: [LayerKind; 8] = [
        LayerKind::Pad,
        LayerKind::Chime,
        LayerKind::Melody,
        LayerKind::Wind,
        LayerKind::Leaves,
        LayerKind::Fireplace,
        LayerKind::Gobble,
        LayerKind::Footsteps,
    ];

    /// Name used in mix specs and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Pad => "pad",
            LayerKind::Chime => "chime",
            LayerKind::Melody => "melody",
            LayerKind::Wind => "wind",
            LayerKind::Leaves => "leaves",
            LayerKind::Fireplace => "fireplace",
            LayerKind::Gobble => "gobble",
            LayerKind::Footsteps => "footsteps",
        }
    }

    pub fn family(&self) -> LayerFamily {
        match self {
            LayerKind::Pad => LayerFamily::Pad,
            LayerKind::Chime => LayerFamily::Chime,
            LayerKind::Melody => LayerFamily::Melody,
            LayerKind::Wind | LayerKind::Leaves | LayerKind::Fireplace => LayerFamily::Texture,
            LayerKind::Gobble | LayerKind::Footsteps => LayerFamily::Percussion,
        }
    }

    /// Gain used when a mix spec does not name this layer
    pub fn default_gain(&self) -> f32 {
        match self {
            LayerKind::Pad => 0.70,
            LayerKind::Melody => 0.25,
            LayerKind::Chime => 0.15,
            LayerKind::Wind => 0.20,
            LayerKind::Leaves => 0.12,
            LayerKind::Fireplace => 0.10,
            LayerKind::Gobble => 0.15,
            LayerKind::Footsteps => 0.12,
        }
    }

    /// Peak level each generator normalizes its output to, before gain
    pub fn nominal_peak(&self) -> f32 {
        match self.family() {
            LayerFamily::Pad => 0.75,
            LayerFamily::Melody => 0.7,
            LayerFamily::Chime => 0.6,
            LayerFamily::Texture => 0.3,
            LayerFamily::Percussion => 0.5,
        }
    }

    /// Corner of the high-pass that keeps the low end clear for the pad
    ///
    /// Only the pad carries energy below this frequency.
    pub fn low_cut_hz(&self) -> Option<f64> {
        match self.family() {
            LayerFamily::Pad => None,
            _ => Some(LOW_CUT_HZ),
        }
    }

    /// Offset mixed into the run seed so each stochastic layer draws its own noise
    fn seed_salt(&self) -> u64 {
        match self {
            LayerKind::Pad => 0x01,
            LayerKind::Chime => 0x02,
            LayerKind::Melody => 0x03,
            LayerKind::Wind => 0x57_49_4E_44,
            LayerKind::Leaves => 0x4C_45_41_46,
            LayerKind::Fireplace => 0x46_49_52_45,
            LayerKind::Gobble => 0x47_4F_42_4C,
            LayerKind::Footsteps => 0x53_54_45_50,
        }
    }

    /// Synthesize this layer
    ///
    /// Returns exactly `round(duration_secs * sample_rate)` samples. Every
    /// layer but the pad is high-passed at [`LOW_CUT_HZ`] before it is
    /// normalized to its nominal peak.
    ///
    /// # Errors
    /// * `InvalidParameter` - non-positive duration, or a sample rate below
    ///   [`MIN_SAMPLE_RATE`](crate::engine::MIN_SAMPLE_RATE)
    /// * `Synthesis` - the duration is shorter than one sample, or the
    ///   generator produced non-finite samples
    pub fn generate(&self, params: &SynthParams<'_>) -> Result<Layer> {
        let num_samples = sample_count(params.duration_secs, params.sample_rate)?;
        if num_samples == 0 {
            return Err(HearthError::synthesis(
                self.name(),
                format!(
                    "{}s at {} Hz is shorter than one sample",
                    params.duration_secs, params.sample_rate
                ),
            ));
        }

        let mut samples = match self {
            LayerKind::Pad => pad::render(params, num_samples)?,
            LayerKind::Chime => chime::render(params, num_samples)?,
            LayerKind::Melody => melody::render(params, num_samples)?,
            LayerKind::Wind => texture::wind(params, num_samples, &mut self.rng(params.seed))?,
            LayerKind::Leaves => texture::leaves(params, num_samples, &mut self.rng(params.seed))?,
            LayerKind::Fireplace => {
                texture::fireplace(params, num_samples, &mut self.rng(params.seed))?
            }
            LayerKind::Gobble => percussion::gobble(params, num_samples)?,
            LayerKind::Footsteps => {
                percussion::footsteps(params, num_samples, &mut self.rng(params.seed))?
            }
        };
        debug_assert_eq!(samples.len(), num_samples);

        if samples.iter().any(|s| !s.is_finite()) {
            return Err(HearthError::synthesis(self.name(), "produced non-finite samples"));
        }

        if let Some(corner) = self.low_cut_hz() {
            FilterChain::butterworth_high_pass(params.sample_rate, corner).process_slice(&mut samples);
        }

        let mut buffer = AudioBuffer::from_samples(samples, params.sample_rate);
        buffer.normalize_to(self.nominal_peak());

        let period_secs = match self.family() {
            LayerFamily::Melody | LayerFamily::Chime => Some(params.palette.phrase_secs()),
            _ => None,
        };

        log::debug!(
            "Generated layer '{}': {} samples, peak {:.3}",
            self.name(),
            buffer.len(),
            buffer.peak()
        );

        Ok(Layer {
            kind: *self,
            buffer,
            gain: self.default_gain(),
            period_secs,
        })
    }

    fn rng(&self, seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed ^ self.seed_salt())
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerKind {
    type Err = HearthError;

    fn from_str(s: &str) -> Result<Self> {
        LayerKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = LayerKind::ALL.iter().map(|k| k.name()).collect();
                HearthError::invalid("layer", s, format!("one of {}", names.join(", ")))
            })
    }
}

/// Inputs shared by every generator
#[derive(Debug, Clone, Copy)]
pub struct SynthParams<'a> {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub palette: &'a Palette,
    /// Run-level seed; only the noise-based layers use it
    pub seed: u64,
}

impl<'a> SynthParams<'a> {
    pub fn new(duration_secs: f64, sample_rate: u32, palette: &'a Palette, seed: u64) -> Self {
        Self {
            duration_secs,
            sample_rate,
            palette,
            seed,
        }
    }
}

/// One synthesized layer, read-only once generated
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    kind: LayerKind,
    buffer: AudioBuffer,
    gain: f32,
    period_secs: Option<f64>,
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    /// Default gain weight for this layer
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Loop period when the layer repeats a fixed pattern
    pub fn period_secs(&self) -> Option<f64> {
        self.period_secs
    }
}

// ============================================================================
// Shared helpers for the generators
// ============================================================================

/// Seconds to samples, rounded to nearest
#[inline]
fn secs_to_samples(secs: f64, sample_rate: u32) -> usize {
    (secs * sample_rate as f64).round().max(0.0) as usize
}

/// Add `segment` into `out` starting at `start`, dropping what overflows
fn mix_into(out: &mut [f32], start: usize, segment: &[f32]) {
    if start >= out.len() {
        return;
    }
    let end = (start + segment.len()).min(out.len());
    for (dst, &src) in out[start..end].iter_mut().zip(segment) {
        *dst += src;
    }
}

/// Start times of each repetition of a pattern across `duration_secs`
fn cycle_starts(duration_secs: f64, period_secs: f64) -> impl Iterator<Item = f64> {
    (0..)
        .map(move |i| i as f64 * period_secs)
        .take_while(move |&t| t < duration_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Spectrum;
    use crate::engine::MIN_SAMPLE_RATE;
    use test_case::test_case;

    fn params(duration_secs: f64, sample_rate: u32, palette: &Palette) -> SynthParams<'_> {
        SynthParams::new(duration_secs, sample_rate, palette, 123)
    }

    #[test_case(LayerKind::Pad, 6.0, 44100 ; "pad 6s")]
    #[test_case(LayerKind::Chime, 6.0, 44100 ; "chime 6s")]
    #[test_case(LayerKind::Melody, 5.0, 48000 ; "melody 5s 48k")]
    #[test_case(LayerKind::Wind, 0.5, 22050 ; "wind short")]
    #[test_case(LayerKind::Leaves, 3.3, 44100 ; "leaves")]
    #[test_case(LayerKind::Fireplace, 2.0001, 44100 ; "fireplace fractional")]
    #[test_case(LayerKind::Gobble, 6.0, 44100 ; "gobble")]
    #[test_case(LayerKind::Footsteps, 12.5, 8000 ; "footsteps long")]
    fn test_generated_length_matches_duration(kind: LayerKind, duration: f64, sr: u32) {
        let palette = Palette::default();
        let layer = kind.generate(&params(duration, sr, &palette)).unwrap();
        let expected = (duration * sr as f64).round() as usize;
        assert_eq!(layer.buffer().len(), expected);
        assert_eq!(layer.buffer().sample_rate(), sr);
        assert!(layer.buffer().is_finite());
        assert!(layer.buffer().peak() <= kind.nominal_peak() + 1e-6);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let palette = Palette::default();
        for kind in LayerKind::ALL {
            let a = kind.generate(&params(2.0, 22050, &palette)).unwrap();
            let b = kind.generate(&params(2.0, 22050, &palette)).unwrap();
            assert_eq!(a, b, "layer '{}' is not deterministic", kind);
        }
    }

    #[test]
    fn test_seed_changes_noise_layers_only() {
        let palette = Palette::default();
        let a = SynthParams::new(1.0, 22050, &palette, 1);
        let b = SynthParams::new(1.0, 22050, &palette, 2);

        let wind_a = LayerKind::Wind.generate(&a).unwrap();
        let wind_b = LayerKind::Wind.generate(&b).unwrap();
        assert_ne!(wind_a.buffer().samples(), wind_b.buffer().samples());

        let pad_a = LayerKind::Pad.generate(&a).unwrap();
        let pad_b = LayerKind::Pad.generate(&b).unwrap();
        assert_eq!(pad_a, pad_b);
    }

    #[test]
    fn test_rejects_non_positive_inputs() {
        let palette = Palette::default();
        for kind in LayerKind::ALL {
            let err = kind.generate(&params(0.0, 44100, &palette)).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_PARAMETER");
            let err = kind.generate(&params(-1.0, 44100, &palette)).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_PARAMETER");
            let err = kind.generate(&params(1.0, 0, &palette)).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_PARAMETER");
        }
    }

    #[test]
    fn test_every_layer_renders_at_lowest_sample_rate() {
        let palette = Palette::default();
        for kind in LayerKind::ALL {
            let layer = kind
                .generate(&params(1.0, MIN_SAMPLE_RATE, &palette))
                .unwrap();
            assert_eq!(layer.buffer().len(), MIN_SAMPLE_RATE as usize);
            assert!(layer.buffer().is_finite(), "layer '{}'", kind);
        }
    }

    #[test]
    fn test_tiny_sample_rates_are_rejected_not_panicking() {
        let palette = Palette::default();
        let tiny = [
            (LayerKind::Wind, 16),
            (LayerKind::Footsteps, 4),
            (LayerKind::Leaves, MIN_SAMPLE_RATE - 1),
        ];
        for (kind, sr) in tiny {
            let err = kind.generate(&params(1.0, sr, &palette)).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_PARAMETER", "{} at {} Hz", kind, sr);
        }
    }

    /// Share of spectral magnitude below `hz`
    fn low_share(layer: &Layer, hz: f64) -> f64 {
        let spectrum = Spectrum::of(layer.buffer());
        spectrum.band_sum(0.0, hz) / spectrum.band_sum(0.0, spectrum.nyquist_hz())
    }

    #[test]
    fn test_only_the_pad_keeps_low_end() {
        let palette = Palette::default();
        let pad = LayerKind::Pad.generate(&params(4.0, 22050, &palette)).unwrap();
        assert!(low_share(&pad, 100.0) > 0.1);

        for kind in LayerKind::ALL.into_iter().filter(|k| *k != LayerKind::Pad) {
            assert_eq!(kind.low_cut_hz(), Some(LOW_CUT_HZ));
            let layer = kind.generate(&params(4.0, 22050, &palette)).unwrap();
            let share = low_share(&layer, 100.0);
            assert!(share < 0.05, "layer '{}' keeps {:.3} below 100 Hz", kind, share);
        }
    }

    #[test]
    fn test_sub_sample_duration_is_synthesis_error() {
        let palette = Palette::default();
        let err = LayerKind::Pad
            .generate(&params(1e-6, 44100, &palette))
            .unwrap_err();
        assert_eq!(err.error_code(), "SYNTHESIS_ERROR");
    }

    #[test]
    fn test_layer_names_round_trip() {
        for kind in LayerKind::ALL {
            assert_eq!(kind.name().parse::<LayerKind>().unwrap(), kind);
        }
        assert_eq!("  Pad ".parse::<LayerKind>().unwrap(), LayerKind::Pad);
        let err = "bongo".parse::<LayerKind>().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_pattern_layers_report_period() {
        let palette = Palette::default();
        let melody = LayerKind::Melody.generate(&params(1.0, 8000, &palette)).unwrap();
        assert_eq!(melody.period_secs(), Some(palette.phrase_secs()));
        let wind = LayerKind::Wind.generate(&params(1.0, 8000, &palette)).unwrap();
        assert_eq!(wind.period_secs(), None);
    }

    #[test]
    fn test_mix_into_truncates() {
        let mut out = vec![0.0; 4];
        mix_into(&mut out, 2, &[1.0, 1.0, 1.0]);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 1.0]);
        mix_into(&mut out, 10, &[1.0]);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_cycle_starts() {
        let starts: Vec<f64> = cycle_starts(13.0, 6.0).collect();
        assert_eq!(starts, vec![0.0, 6.0, 12.0]);
    }
}
