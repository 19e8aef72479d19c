//! Hearthtone CLI
//!
//! Command-line interface for rendering and muxing procedural soundtracks.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use hearthtone::cli::{commands, Cli, Commands};
use hearthtone::SoundtrackConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still takes precedence
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    info!("Hearthtone v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => SoundtrackConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SoundtrackConfig::default(),
    };

    let result = match cli.command {
        Commands::Render { out, overrides } => {
            overrides.apply(&mut config);
            commands::render(config, &out)
        }
        Commands::Mux {
            video,
            out,
            audio_out,
            tool,
            timeout,
            overrides,
        } => {
            overrides.apply(&mut config);
            if let Some(tool) = tool {
                config.mux.tool = tool;
            }
            if let Some(timeout) = timeout {
                config.mux.timeout_secs = timeout;
            }
            commands::mux(config, &video, &out, audio_out)
        }
        Commands::Encode {
            out,
            wav_out,
            tool,
            overrides,
        } => {
            overrides.apply(&mut config);
            if let Some(tool) = tool {
                config.mux.tool = tool;
            }
            commands::encode(config, &out, wav_out.as_deref())
        }
        Commands::Layer {
            name,
            out,
            overrides,
        } => {
            overrides.apply(&mut config);
            commands::layer(config, name, &out)
        }
        Commands::Layers => commands::list_layers(),
        Commands::Analyze { wav } => commands::analyze_file(&wav),
    };

    if let Err(e) = &result {
        for suggestion in e.recovery_suggestions() {
            log::warn!("hint: {}", suggestion);
        }
    }
    result.with_context(|| "hearthtone-cli failed".to_string())
}
