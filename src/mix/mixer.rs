//! Weighted layer summation with a single uniform normalization pass

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::MixSpec;
use crate::engine::AudioBuffer;
use crate::error::{HearthError, Result};
use crate::layers::Layer;

/// Energy one layer contributes to the final mix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerContribution {
    pub name: String,
    pub gain: f32,
    /// Sum of squares of the layer's gained, normalized samples
    pub energy: f64,
}

/// What the mixer did to produce its output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixReport {
    /// Peak of the raw weighted sum
    pub pre_peak: f32,
    /// Uniform scale applied to the whole sum (1.0 when untouched)
    pub scale: f32,
    pub normalized: bool,
    pub contributions: Vec<LayerContribution>,
}

impl MixReport {
    /// Each layer's share of the total mixed energy
    ///
    /// Shares are unchanged by normalization and by scaling every gain by
    /// the same factor.
    pub fn balance(&self) -> BTreeMap<String, f64> {
        let total: f64 = self.contributions.iter().map(|c| c.energy).sum();
        self.contributions
            .iter()
            .map(|c| {
                let share = if total > 0.0 { c.energy / total } else { 0.0 };
                (c.name.clone(), share)
            })
            .collect()
    }
}

/// Mixed buffer plus the report describing it
#[derive(Debug, Clone)]
pub struct MixOutcome {
    pub buffer: AudioBuffer,
    pub report: MixReport,
}

/// Sums layers under a validated [`MixSpec`]
#[derive(Debug, Clone)]
pub struct Mixer {
    spec: MixSpec,
}

impl Mixer {
    /// # Errors
    /// * `InvalidParameter` - the spec carries a negative or non-finite gain
    pub fn new(spec: MixSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &MixSpec {
        &self.spec
    }

    /// Gain applied to `layer`: the spec's weight if named, else the layer default
    pub fn gain_for(&self, layer: &Layer) -> f32 {
        self.spec.gain(layer.name()).unwrap_or_else(|| layer.gain())
    }

    /// Mix `layers` into one buffer as long as the longest layer
    ///
    /// Shorter layers are treated as silent past their end. When the summed
    /// peak exceeds the spec ceiling the whole buffer is scaled down by
    /// `ceiling / peak`; otherwise it is returned untouched.
    ///
    /// # Errors
    /// * `InvalidParameter` - no layers, the spec names a layer not in
    ///   `layers`, a layer appears twice, or sample rates differ
    pub fn mix(&self, layers: &[Layer]) -> Result<MixOutcome> {
        let first = layers
            .first()
            .ok_or_else(|| HearthError::invalid("layers", "none", "at least one layer"))?;
        let sample_rate = first.buffer().sample_rate();

        let mut seen = BTreeSet::new();
        for layer in layers {
            if !seen.insert(layer.name()) {
                return Err(HearthError::invalid(
                    "layers",
                    layer.name(),
                    "each layer generated once",
                ));
            }
            if layer.buffer().sample_rate() != sample_rate {
                return Err(HearthError::invalid(
                    format!("{}.sample_rate", layer.name()),
                    layer.buffer().sample_rate(),
                    format!("{} Hz like every other layer", sample_rate),
                ));
            }
        }
        if let Some(unknown) = self.spec.names().find(|name| !seen.contains(*name)) {
            let available: Vec<&str> = seen.iter().copied().collect();
            return Err(HearthError::invalid(
                "mix layer",
                unknown,
                format!("one of the generated layers: {}", available.join(", ")),
            ));
        }

        let num_samples = layers.iter().map(|l| l.buffer().len()).max().unwrap_or(0);
        let mut sum = vec![0.0_f64; num_samples];
        for layer in layers {
            let gain = self.gain_for(layer) as f64;
            for (acc, &s) in sum.iter_mut().zip(layer.buffer().samples()) {
                *acc += gain * s as f64;
            }
        }

        let pre_peak = sum.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        let ceiling = self.spec.ceiling() as f64;
        let normalized = pre_peak > ceiling;
        let scale = if normalized { ceiling / pre_peak } else { 1.0 };
        if normalized {
            log::warn!(
                "Mix peak {:.3} exceeds ceiling {:.3}; scaling by {:.4}",
                pre_peak,
                ceiling,
                scale
            );
        }

        let ceiling_f32 = self.spec.ceiling();
        // Clamp only absorbs f64 -> f32 rounding at the ceiling
        let samples: Vec<f32> = sum
            .iter()
            .map(|&s| ((s * scale) as f32).clamp(-ceiling_f32, ceiling_f32))
            .collect();

        let contributions = layers
            .iter()
            .map(|layer| {
                let gain = self.gain_for(layer);
                let factor = gain as f64 * scale;
                let energy = layer
                    .buffer()
                    .samples()
                    .iter()
                    .map(|&s| {
                        let v = s as f64 * factor;
                        v * v
                    })
                    .sum::<f64>();
                LayerContribution {
                    name: layer.name().to_string(),
                    gain,
                    energy,
                }
            })
            .collect();

        log::debug!(
            "Mixed {} layers into {} samples (pre-peak {:.3})",
            layers.len(),
            num_samples,
            pre_peak
        );

        Ok(MixOutcome {
            buffer: AudioBuffer::from_samples(samples, sample_rate),
            report: MixReport {
                pre_peak: pre_peak as f32,
                scale: scale as f32,
                normalized,
                contributions,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Palette;
    use crate::layers::{LayerKind, SynthParams};
    use approx::assert_relative_eq;

    fn generate(kinds: &[LayerKind], duration: f64, sr: u32) -> Vec<Layer> {
        let palette = Palette::default();
        let params = SynthParams::new(duration, sr, &palette, 123);
        kinds.iter().map(|k| k.generate(&params).unwrap()).collect()
    }

    #[test]
    fn test_pad_and_melody_scenario() {
        let layers = generate(&[LayerKind::Pad, LayerKind::Melody], 6.0, 44100);
        let spec = MixSpec::from_pairs(&[("pad", 0.6), ("melody", 0.8)]).unwrap();
        let outcome = Mixer::new(spec).unwrap().mix(&layers).unwrap();

        assert_eq!(outcome.buffer.len(), 264600);
        assert!(outcome.buffer.peak() <= 1.0);
    }

    #[test]
    fn test_unknown_layer_is_rejected() {
        let layers = generate(&[LayerKind::Pad, LayerKind::Melody], 1.0, 8000);
        let spec = MixSpec::new().with_gain("pad", 0.5).with_gain("bongo", 0.5);
        let err = Mixer::new(spec).unwrap().mix(&layers).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
        assert!(err.to_string().contains("bongo"));
    }

    #[test]
    fn test_negative_gain_is_rejected() {
        let err = Mixer::new(MixSpec::new().with_gain("pad", -0.5)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_mismatched_sample_rates_are_rejected() {
        let mut layers = generate(&[LayerKind::Pad], 1.0, 8000);
        layers.extend(generate(&[LayerKind::Melody], 1.0, 16000));
        assert!(Mixer::new(MixSpec::new()).unwrap().mix(&layers).is_err());
    }

    #[test]
    fn test_duplicate_layers_are_rejected() {
        let layers = generate(&[LayerKind::Pad, LayerKind::Pad], 1.0, 8000);
        assert!(Mixer::new(MixSpec::new()).unwrap().mix(&layers).is_err());
    }

    #[test]
    fn test_output_spans_longest_layer() {
        let mut layers = generate(&[LayerKind::Pad], 2.0, 8000);
        layers.extend(generate(&[LayerKind::Chime], 1.0, 8000));
        let outcome = Mixer::new(MixSpec::new()).unwrap().mix(&layers).unwrap();
        assert_eq!(outcome.buffer.len(), 16000);
    }

    #[test]
    fn test_quiet_mix_is_untouched() {
        let layers = generate(&[LayerKind::Pad], 1.0, 8000);
        let spec = MixSpec::new().with_gain("pad", 0.5);
        let outcome = Mixer::new(spec).unwrap().mix(&layers).unwrap();

        assert!(!outcome.report.normalized);
        assert_eq!(outcome.report.scale, 1.0);
        assert!(outcome.buffer.peak() < 1.0);
        assert_relative_eq!(
            outcome.buffer.samples()[4000],
            layers[0].buffer().samples()[4000] * 0.5,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_loud_mix_is_normalized_to_ceiling() {
        let layers = generate(&[LayerKind::Pad, LayerKind::Melody], 2.0, 8000);
        let spec = MixSpec::from_pairs(&[("pad", 4.0), ("melody", 4.0)]).unwrap();
        let outcome = Mixer::new(spec).unwrap().mix(&layers).unwrap();

        assert!(outcome.report.normalized);
        assert!(outcome.report.pre_peak > 1.0);
        assert_relative_eq!(outcome.buffer.peak(), 1.0, epsilon = 1e-6);
        assert!(outcome.buffer.peak() <= 1.0);
    }

    #[test]
    fn test_uniform_gain_scaling_preserves_balance() {
        let layers = generate(&[LayerKind::Pad, LayerKind::Melody, LayerKind::Wind], 2.0, 8000);
        // Quiet enough to stay under the ceiling; ten times louder is not
        let spec = MixSpec::from_pairs(&[("pad", 0.2), ("melody", 0.2), ("wind", 0.1)]).unwrap();

        let quiet = Mixer::new(spec.clone()).unwrap().mix(&layers).unwrap();
        let loud = Mixer::new(spec.scaled(10.0)).unwrap().mix(&layers).unwrap();
        assert!(!quiet.report.normalized);
        assert!(loud.report.normalized);

        // The louder mix is the quieter one times a single factor, sample by sample
        let factor = 10.0 * loud.report.scale / quiet.report.scale;
        assert!(factor > 1.0);
        for (&q, &l) in quiet.buffer.samples().iter().zip(loud.buffer.samples()) {
            assert_relative_eq!(l, q * factor, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_normalization_scales_layers_together() {
        // Pad alone reaches the ceiling once normalized; a per-layer pass would
        // leave the quiet wind at its own peak instead of scaling it down too
        let layers = generate(&[LayerKind::Pad, LayerKind::Wind], 1.0, 8000);
        let spec = MixSpec::from_pairs(&[("pad", 3.0), ("wind", 0.1)]).unwrap();
        let outcome = Mixer::new(spec).unwrap().mix(&layers).unwrap();
        let scale = outcome.report.scale;
        assert!(scale < 1.0);

        for i in (0..8000).step_by(97) {
            let expected = (3.0 * layers[0].buffer().samples()[i]
                + 0.1 * layers[1].buffer().samples()[i])
                * scale;
            assert_relative_eq!(outcome.buffer.samples()[i], expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_unnamed_layers_use_default_gain() {
        let layers = generate(&[LayerKind::Wind], 1.0, 8000);
        let mixer = Mixer::new(MixSpec::new()).unwrap();
        assert_eq!(mixer.gain_for(&layers[0]), LayerKind::Wind.default_gain());
    }
}
