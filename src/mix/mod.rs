//! Mixing and loop fitting
//!
//! [`Mixer`] sums generated layers under a [`MixSpec`] and applies one
//! uniform normalization pass; [`LoopFitter`] trims or loops the result to
//! the exact length of the silent video.

pub mod loop_fit;
pub mod mixer;

pub use loop_fit::{FittedBuffer, LoopFitter, Seam};
pub use mixer::{LayerContribution, MixOutcome, MixReport, Mixer};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::FULL_SCALE;
use crate::error::{HearthError, Result};

/// Gain weight per layer name
///
/// Layers the spec does not name are mixed at their default gain. Every
/// name the spec does mention must belong to a layer handed to the mixer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixSpec {
    gains: BTreeMap<String, f32>,
    /// Peak the mixed output may reach
    ceiling: f32,
}

impl Default for MixSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl MixSpec {
    /// Empty spec with the full-scale ceiling
    pub fn new() -> Self {
        Self {
            gains: BTreeMap::new(),
            ceiling: FULL_SCALE,
        }
    }

    /// Build from `(name, gain)` pairs
    ///
    /// # Errors
    /// * `InvalidParameter` - a name appears twice
    pub fn from_pairs<S: AsRef<str>>(pairs: &[(S, f32)]) -> Result<Self> {
        let mut spec = Self::new();
        for (name, gain) in pairs {
            let name = name.as_ref();
            if spec.gains.contains_key(name) {
                return Err(HearthError::invalid(
                    "mix.gains",
                    name,
                    "each layer named at most once",
                ));
            }
            spec.gains.insert(name.to_string(), *gain);
        }
        Ok(spec)
    }

    /// Builder-style [`MixSpec::set_gain`]
    pub fn with_gain(mut self, name: impl Into<String>, gain: f32) -> Self {
        self.set_gain(name, gain);
        self
    }

    /// Set or replace the gain for one layer
    pub fn set_gain(&mut self, name: impl Into<String>, gain: f32) {
        self.gains.insert(name.into(), gain);
    }

    pub fn gain(&self, name: &str) -> Option<f32> {
        self.gains.get(name).copied()
    }

    /// Layer names the spec mentions, in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.gains.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.gains.is_empty()
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    pub fn with_ceiling(mut self, ceiling: f32) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Same spec with every gain multiplied by `factor`
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            gains: self
                .gains
                .iter()
                .map(|(name, gain)| (name.clone(), gain * factor))
                .collect(),
            ceiling: self.ceiling,
        }
    }

    /// Check every gain and the ceiling
    ///
    /// # Errors
    /// * `InvalidParameter` - a negative or non-finite gain, or a ceiling
    ///   outside (0, 1]
    pub fn validate(&self) -> Result<()> {
        if !(self.ceiling > 0.0 && self.ceiling <= FULL_SCALE) {
            return Err(HearthError::invalid(
                "mix.ceiling",
                self.ceiling,
                format!("a level in (0, {}]", FULL_SCALE),
            ));
        }
        for (name, &gain) in &self.gains {
            if !gain.is_finite() || gain < 0.0 {
                return Err(HearthError::invalid(
                    format!("gain[{}]", name),
                    gain,
                    "a finite gain >= 0",
                ));
            }
        }
        Ok(())
    }
}
