//! Hearthtone - Procedural Ambient Soundtracks
//!
//! Synthesizes a short ambient soundtrack entirely from generated
//! waveforms, fits it to the length of a silent looping video, and hands it
//! to an external tool for muxing.
//!
//! # Architecture
//!
//! Each stage consumes the previous stage's output and produces a new buffer:
//! - Layer generators: pad, chime, melody, noise textures and percussive hits
//! - Envelope shaper: click-free per-note and per-layer amplitude shaping
//! - Mixer: weighted sum with one uniform normalization pass
//! - Loop fitter: truncate, or loop with crossfaded seams, to an exact length
//! - Exporter/muxer bridge: WAV export and the external tool boundary

pub mod analysis;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod export;
pub mod layers;
pub mod mix;
pub mod pipeline;
pub mod report;

pub use config::{MuxSettings, Palette, SoundtrackConfig};
pub use engine::AudioBuffer;
pub use error::{HearthError, MuxFailure, Result};
pub use layers::{Layer, LayerKind, SynthParams};
pub use mix::{LoopFitter, MixSpec, Mixer};
pub use pipeline::{FinalTrack, Renderer};
