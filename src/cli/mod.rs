//! CLI Module
//!
//! Command-line interface for rendering, muxing and inspecting soundtracks.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::SoundtrackConfig;
use crate::layers::LayerKind;

/// Hearthtone - procedural ambient soundtracks for short looping videos
#[derive(Parser, Debug)]
#[command(name = "hearthtone-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON config file; missing fields take their defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides applied on top of the config file
#[derive(Args, Debug, Clone, Default)]
pub struct RenderOverrides {
    /// Target duration in seconds (must match the silent video)
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Render the layers at this length and loop/trim to the target
    #[arg(long)]
    pub render_duration: Option<f64>,

    /// Sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Seed for the noise-based layers
    #[arg(long)]
    pub seed: Option<u64>,
}

impl RenderOverrides {
    pub fn apply(&self, config: &mut SoundtrackConfig) {
        if let Some(duration) = self.duration {
            config.target_duration_secs = duration;
        }
        if let Some(render_duration) = self.render_duration {
            config.render_duration_secs = Some(render_duration);
        }
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the soundtrack to a WAV file
    #[command(name = "render")]
    Render {
        /// Output WAV path
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        overrides: RenderOverrides,
    },

    /// Render the soundtrack and mux it into a silent video
    #[command(name = "mux")]
    Mux {
        /// Silent input video
        #[arg(long)]
        video: PathBuf,

        /// Final video with audio
        #[arg(short, long)]
        out: PathBuf,

        /// Keep the rendered WAV here
        #[arg(long)]
        audio_out: Option<PathBuf>,

        /// Path to the audio/video tool
        #[arg(long)]
        tool: Option<PathBuf>,

        /// Seconds to wait for the tool before killing it
        #[arg(long)]
        timeout: Option<u64>,

        #[command(flatten)]
        overrides: RenderOverrides,
    },

    /// Render the soundtrack and encode it as compressed web audio
    #[command(name = "encode")]
    Encode {
        /// Output path, e.g. track.mp3
        #[arg(short, long)]
        out: PathBuf,

        /// Keep the rendered WAV here
        #[arg(long)]
        wav_out: Option<PathBuf>,

        /// Path to the audio/video tool
        #[arg(long)]
        tool: Option<PathBuf>,

        #[command(flatten)]
        overrides: RenderOverrides,
    },

    /// Render a single layer to its own WAV
    #[command(name = "layer")]
    Layer {
        /// Layer name (see 'layers')
        name: LayerKind,

        /// Output WAV path
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        overrides: RenderOverrides,
    },

    /// List available layers
    #[command(name = "layers")]
    Layers,

    /// Print a quality report for a WAV file
    #[command(name = "analyze")]
    Analyze {
        /// WAV file to analyze
        wav: PathBuf,
    },
}
