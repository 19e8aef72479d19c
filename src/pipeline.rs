//! Render pipeline
//!
//! Layer generators → Mixer → Loop Fitter → optional master fade. Each
//! stage consumes the previous stage's output and produces a new buffer;
//! stopping between stages simply means not calling the next one.

use std::path::Path;

use crate::config::SoundtrackConfig;
use crate::dsp::Envelope;
use crate::engine::{export_wav, AudioBuffer, ExportFormat};
use crate::error::Result;
use crate::layers::{Layer, LayerKind, SynthParams};
use crate::mix::{LoopFitter, MixReport, MixSpec, Mixer, Seam};

/// The finished, duration-fitted soundtrack
#[derive(Debug, Clone)]
pub struct FinalTrack {
    buffer: AudioBuffer,
    seams: Vec<Seam>,
    truncated: bool,
    mix_report: MixReport,
    layers: Vec<LayerKind>,
    seed: u64,
}

impl FinalTrack {
    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> AudioBuffer {
        self.buffer
    }

    /// Loop seams inside the track; empty when the mix was truncated
    pub fn seams(&self) -> &[Seam] {
        &self.seams
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn mix_report(&self) -> &MixReport {
        &self.mix_report
    }

    pub fn layers(&self) -> &[LayerKind] {
        &self.layers
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer.duration_secs()
    }

    pub fn export_wav(&self, path: &Path, format: ExportFormat) -> Result<()> {
        export_wav(&self.buffer, path, format)
    }
}

/// Runs the synthesis pipeline for one validated config
#[derive(Debug, Clone)]
pub struct Renderer {
    config: SoundtrackConfig,
    fitter: LoopFitter,
}

impl Renderer {
    /// # Errors
    /// * `InvalidParameter` - the config fails validation
    pub fn new(config: SoundtrackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            fitter: LoopFitter::default(),
        })
    }

    pub fn with_fitter(mut self, fitter: LoopFitter) -> Self {
        self.fitter = fitter;
        self
    }

    pub fn config(&self) -> &SoundtrackConfig {
        &self.config
    }

    /// Generator inputs at the render length
    pub fn synth_params(&self) -> SynthParams<'_> {
        SynthParams::new(
            self.config.render_duration(),
            self.config.sample_rate,
            &self.config.palette,
            self.config.seed,
        )
    }

    pub fn render_layer(&self, kind: LayerKind) -> Result<Layer> {
        kind.generate(&self.synth_params())
    }

    /// Generate every configured layer, in config order
    pub fn render_layers(&self) -> Result<Vec<Layer>> {
        let params = self.synth_params();
        self.config
            .layers
            .iter()
            .map(|kind| kind.generate(&params))
            .collect()
    }

    /// Mix spec built from the configured gains
    ///
    /// Gains for valid layers that are not selected for this run are
    /// skipped. A gain keyed by a name that is not a layer at all is an
    /// error.
    pub fn mix_spec(&self) -> Result<MixSpec> {
        let mut spec = MixSpec::new();
        for (name, &gain) in &self.config.gains {
            let kind: LayerKind = name.parse()?;
            if self.config.layers.contains(&kind) {
                spec.set_gain(kind.name(), gain);
            } else {
                log::debug!("Skipping gain for unselected layer '{}'", name);
            }
        }
        Ok(spec)
    }

    /// Render the full soundtrack
    ///
    /// # Errors
    /// * `InvalidParameter` - bad gains or layer names
    /// * `Synthesis` - a generator failed
    pub fn render(&self) -> Result<FinalTrack> {
        log::info!(
            "Rendering {} layers at {} Hz, target {:.2}s (seed {})",
            self.config.layers.len(),
            self.config.sample_rate,
            self.config.target_duration_secs,
            self.config.seed
        );

        let layers = self.render_layers()?;
        let outcome = Mixer::new(self.mix_spec()?)?.mix(&layers)?;
        let fitted = self
            .fitter
            .fit(&outcome.buffer, self.config.target_duration_secs)?;

        let truncated = fitted.truncated();
        let seams = fitted.seams().to_vec();
        let mut buffer = fitted.into_buffer();

        if self.config.master_fade_secs > 0.0 {
            let fade = self.config.master_fade_secs;
            buffer = Envelope::fade(buffer.duration_secs(), fade, fade)?.apply(&buffer)?;
        }

        log::info!(
            "Rendered {:.2}s ({} samples, peak {:.3}, {} seams)",
            buffer.duration_secs(),
            buffer.len(),
            buffer.peak(),
            seams.len()
        );

        Ok(FinalTrack {
            buffer,
            seams,
            truncated,
            mix_report: outcome.report,
            layers: self.config.layers.clone(),
            seed: self.config.seed,
        })
    }
}
