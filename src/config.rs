//! Run configuration
//!
//! Everything a synthesis run depends on lives here and is passed down
//! explicitly: the musical palette every generator reads, the mix gains,
//! and the settings for the external muxing tool. A run never consults
//! global state, so the same config always renders the same audio.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dsp::transpose;
use crate::engine::buffer::sample_count;
use crate::engine::{ExportFormat, DEFAULT_SAMPLE_RATE};
use crate::error::{HearthError, Result};
use crate::layers::LayerKind;

// ============================================================================
// Palette
// ============================================================================

/// A scheduled note: scale degree, position in beats, and loudness
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Index into the pentatonic scale; degrees past the end climb octaves
    pub degree: usize,
    pub onset_beats: f64,
    pub length_beats: f64,
    /// 0.0 to 1.0
    pub velocity: f32,
}

impl NoteEvent {
    pub const fn new(degree: usize, onset_beats: f64, length_beats: f64, velocity: f32) -> Self {
        Self {
            degree,
            onset_beats,
            length_beats,
            velocity,
        }
    }
}

/// Fixed musical constants shared by every generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    /// Human-readable key, e.g. "C major"
    pub key_name: String,
    /// Tonic frequency in Hz (C3 by default)
    pub tonic_hz: f64,
    pub tempo_bpm: f64,
    /// Length of one melody/chime cycle in beats
    pub phrase_beats: f64,
    /// Pad chord tones in semitones from the tonic
    pub chord_semitones: Vec<f64>,
    /// Major pentatonic degrees in semitones from the scale root
    pub pentatonic_semitones: Vec<f64>,
    /// Octaves between the tonic and the pentatonic scale root
    pub pentatonic_octave: i32,
    pub melody: Vec<NoteEvent>,
    pub chimes: Vec<NoteEvent>,
    pub gobble_times_secs: Vec<f64>,
    pub footstep_times_secs: Vec<f64>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            key_name: "C major".to_string(),
            tonic_hz: 130.81,
            tempo_bpm: 80.0,
            phrase_beats: 8.0,
            // C2, G2, C3, E3, G3
            chord_semitones: vec![-12.0, -5.0, 0.0, 4.0, 7.0],
            // C, D, E, G, A
            pentatonic_semitones: vec![0.0, 2.0, 4.0, 7.0, 9.0],
            pentatonic_octave: 2,
            melody: vec![
                NoteEvent::new(0, 0.5, 2.0, 0.9),
                NoteEvent::new(1, 2.5, 1.5, 0.8),
                NoteEvent::new(2, 4.0, 2.0, 0.95),
                NoteEvent::new(3, 6.0, 1.0, 0.75),
                NoteEvent::new(0, 7.0, 0.9, 0.8),
            ],
            chimes: vec![
                NoteEvent::new(5, 2.0, 1.6, 0.6),
                NoteEvent::new(7, 3.5, 1.6, 0.5),
                NoteEvent::new(8, 5.0, 1.6, 0.55),
                NoteEvent::new(9, 6.5, 1.3, 0.5),
            ],
            gobble_times_secs: vec![1.2, 4.1],
            footstep_times_secs: vec![0.3, 0.9, 1.5, 3.3, 3.9, 4.5],
        }
    }
}

impl Palette {
    /// Seconds per beat
    pub fn beat_secs(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    /// Seconds per melody/chime cycle
    pub fn phrase_secs(&self) -> f64 {
        self.phrase_beats * self.beat_secs()
    }

    /// Pad chord frequencies in Hz
    pub fn chord_frequencies(&self) -> Vec<f64> {
        self.chord_semitones
            .iter()
            .map(|&st| transpose(self.tonic_hz, st))
            .collect()
    }

    /// Frequency of a pentatonic degree in Hz
    pub fn scale_frequency(&self, degree: usize) -> f64 {
        let len = self.pentatonic_semitones.len().max(1);
        let octave = (degree / len) as f64 + self.pentatonic_octave as f64;
        let step = self
            .pentatonic_semitones
            .get(degree % len)
            .copied()
            .unwrap_or(0.0);
        transpose(self.tonic_hz, 12.0 * octave + step)
    }

    /// Check the palette describes something playable
    pub fn validate(&self) -> Result<()> {
        if !(self.tonic_hz.is_finite() && self.tonic_hz > 0.0) {
            return Err(HearthError::invalid("palette.tonic_hz", self.tonic_hz, "> 0 Hz"));
        }
        if !(self.tempo_bpm.is_finite() && self.tempo_bpm > 0.0) {
            return Err(HearthError::invalid("palette.tempo_bpm", self.tempo_bpm, "> 0 BPM"));
        }
        if !(self.phrase_beats.is_finite() && self.phrase_beats > 0.0) {
            return Err(HearthError::invalid(
                "palette.phrase_beats",
                self.phrase_beats,
                "> 0 beats",
            ));
        }
        if self.chord_semitones.is_empty() {
            return Err(HearthError::invalid("palette.chord_semitones", "[]", "at least one chord tone"));
        }
        if self.pentatonic_semitones.is_empty() {
            return Err(HearthError::invalid(
                "palette.pentatonic_semitones",
                "[]",
                "at least one scale degree",
            ));
        }
        for note in self.melody.iter().chain(self.chimes.iter()) {
            if !(note.onset_beats.is_finite() && note.onset_beats >= 0.0) {
                return Err(HearthError::invalid("note.onset_beats", note.onset_beats, ">= 0"));
            }
            if !(note.length_beats.is_finite() && note.length_beats > 0.0) {
                return Err(HearthError::invalid("note.length_beats", note.length_beats, "> 0"));
            }
            if !(0.0..=1.0).contains(&note.velocity) {
                return Err(HearthError::invalid("note.velocity", note.velocity, "0.0 to 1.0"));
            }
        }
        for &t in self.gobble_times_secs.iter().chain(self.footstep_times_secs.iter()) {
            if !(t.is_finite() && t >= 0.0) {
                return Err(HearthError::invalid("hit time", t, ">= 0 seconds"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Mux Settings
// ============================================================================

/// How the external audio/video tool is invoked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxSettings {
    /// Tool binary name or path
    pub tool: PathBuf,
    pub timeout_secs: u64,
    /// Codec for the audio track in the final video
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Stop at the shorter of the two streams
    pub shortest: bool,
    /// Codec for the standalone compressed audio file
    pub web_codec: String,
    pub web_bitrate: String,
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            tool: PathBuf::from("ffmpeg"),
            timeout_secs: 120,
            audio_codec: "aac".to_string(),
            audio_bitrate: "320k".to_string(),
            shortest: true,
            web_codec: "libmp3lame".to_string(),
            web_bitrate: "192k".to_string(),
        }
    }
}

// ============================================================================
// Soundtrack Config
// ============================================================================

/// Complete configuration for one synthesis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundtrackConfig {
    pub sample_rate: u32,
    /// Must match the silent video's duration
    pub target_duration_secs: f64,
    /// Length the layers are rendered at; defaults to the target
    pub render_duration_secs: Option<f64>,
    /// Seed for the stochastic texture and percussion layers
    pub seed: u64,
    pub layers: Vec<LayerKind>,
    /// Per-layer gain weights, keyed by layer name
    pub gains: BTreeMap<String, f32>,
    pub palette: Palette,
    /// Fade in/out applied to the finished track (0 disables)
    pub master_fade_secs: f64,
    pub export: ExportFormat,
    pub mux: MuxSettings,
}

impl Default for SoundtrackConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            target_duration_secs: 6.0,
            render_duration_secs: None,
            seed: 123,
            layers: LayerKind::ALL.to_vec(),
            gains: LayerKind::ALL
                .iter()
                .map(|kind| (kind.name().to_string(), kind.default_gain()))
                .collect(),
            palette: Palette::default(),
            master_fade_secs: 0.0,
            export: ExportFormat::default(),
            mux: MuxSettings::default(),
        }
    }
}

impl SoundtrackConfig {
    /// Load and validate a JSON config file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HearthError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let text = fs::read_to_string(path)?;
        let config: SoundtrackConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Length the layers are rendered at
    pub fn render_duration(&self) -> f64 {
        self.render_duration_secs.unwrap_or(self.target_duration_secs)
    }

    /// Check every parameter; nothing is clamped
    pub fn validate(&self) -> Result<()> {
        sample_count(self.target_duration_secs, self.sample_rate)?;
        sample_count(self.render_duration(), self.sample_rate)?;

        if self.layers.is_empty() {
            return Err(HearthError::invalid("layers", "[]", "at least one layer"));
        }
        for (name, &gain) in &self.gains {
            if !gain.is_finite() || gain < 0.0 {
                return Err(HearthError::invalid(
                    format!("gains.{}", name),
                    gain,
                    "a finite gain >= 0",
                ));
            }
        }
        if !(self.master_fade_secs.is_finite() && self.master_fade_secs >= 0.0) {
            return Err(HearthError::invalid(
                "master_fade_secs",
                self.master_fade_secs,
                ">= 0 seconds",
            ));
        }
        if self.mux.timeout_secs == 0 {
            return Err(HearthError::invalid("mux.timeout_secs", 0, "> 0 seconds"));
        }
        self.palette.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = SoundtrackConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.layers.len(), 8);
        assert_eq!(config.gains.get("pad"), Some(&0.70));
    }

    #[test]
    fn test_palette_frequencies() {
        let palette = Palette::default();
        let chord = palette.chord_frequencies();
        assert_relative_eq!(chord[0], 65.405, epsilon = 1e-3);
        assert_relative_eq!(chord[3], 164.81, epsilon = 0.05);

        // Degree 0 is C5, degree 5 wraps to C6
        assert_relative_eq!(palette.scale_frequency(0), 523.24, epsilon = 1e-6);
        assert_relative_eq!(palette.scale_frequency(4), 880.0, epsilon = 0.1);
        assert_relative_eq!(palette.scale_frequency(5), 1046.48, epsilon = 1e-6);
    }

    #[test]
    fn test_phrase_length() {
        let palette = Palette::default();
        assert_relative_eq!(palette.beat_secs(), 0.75);
        assert_relative_eq!(palette.phrase_secs(), 6.0);
    }

    #[test]
    fn test_rejects_negative_gain() {
        let mut config = SoundtrackConfig::default();
        config.gains.insert("pad".to_string(), -0.5);
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let mut config = SoundtrackConfig::default();
        config.target_duration_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = SoundtrackConfig::default();
        config.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "target_duration_secs": 5.5, "seed": 7, "gains": { "pad": 0.6, "melody": 0.8 } }"#,
        )
        .unwrap();

        let config = SoundtrackConfig::from_json_file(&path).unwrap();
        assert_relative_eq!(config.target_duration_secs, 5.5);
        assert_eq!(config.seed, 7);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.gains.len(), 2);
        assert_eq!(config.palette, Palette::default());
    }

    #[test]
    fn test_layer_names_in_json() {
        let config: SoundtrackConfig =
            serde_json::from_str(r#"{ "layers": ["pad", "wind", "gobble"] }"#).unwrap();
        assert_eq!(
            config.layers,
            vec![LayerKind::Pad, LayerKind::Wind, LayerKind::Gobble]
        );
    }
}
