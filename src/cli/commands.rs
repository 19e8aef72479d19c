//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};

use log::info;

use crate::analysis::analyze;
use crate::config::SoundtrackConfig;
use crate::engine::{export_wav, import_wav};
use crate::error::{HearthError, Result};
use crate::export::{ensure_parent, MuxRequest, Muxer, ScopedArtifact};
use crate::layers::LayerKind;
use crate::pipeline::Renderer;
use crate::report::RunReport;

/// Render the full soundtrack to a WAV file.
pub fn render(config: SoundtrackConfig, out: &Path) -> Result<()> {
    let renderer = Renderer::new(config)?;
    let track = renderer.render()?;

    ensure_parent(out)?;
    let staged = ScopedArtifact::staging_for(out);
    track.export_wav(staged.path(), renderer.config().export)?;
    let out = staged.persist_to(out)?;
    info!("Wrote {}", out.display());

    let mut report = RunReport::new("render", &track);
    report.add_output(&out)?;
    println!("{}", report.to_json()?);
    Ok(())
}

/// Render the soundtrack and mux it into the silent video.
pub fn mux(
    config: SoundtrackConfig,
    video: &Path,
    out: &Path,
    audio_out: Option<PathBuf>,
) -> Result<()> {
    // A missing video fails before any synthesis work
    if !video.is_file() {
        return Err(HearthError::FileNotFound {
            path: video.display().to_string(),
        });
    }

    let renderer = Renderer::new(config)?;
    let track = renderer.render()?;
    let muxer = Muxer::new(renderer.config().mux.clone());

    let mut request = MuxRequest::new(video, out);
    if let Some(path) = audio_out {
        request = request.with_audio_out(path);
    }
    let outcome = muxer.mux(track.buffer(), &request, renderer.config().export)?;

    let mut report = RunReport::new("mux", &track);
    report.add_output(&outcome.output)?;
    if let Some(audio) = &outcome.audio {
        report.add_output(audio)?;
    }
    println!("{}", report.with_mux(outcome).to_json()?);
    Ok(())
}

/// Render the soundtrack and encode it as compressed web audio.
pub fn encode(config: SoundtrackConfig, out: &Path, wav_out: Option<&Path>) -> Result<()> {
    let renderer = Renderer::new(config)?;
    let track = renderer.render()?;
    let muxer = Muxer::new(renderer.config().mux.clone());

    let wav_dest = wav_out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out.with_extension("wav"));
    ensure_parent(&wav_dest)?;
    let wav = ScopedArtifact::staging_for(&wav_dest);
    track.export_wav(wav.path(), renderer.config().export)?;
    let encoded = muxer.encode_audio(wav.path(), out)?;

    let mut report = RunReport::new("encode", &track);
    report.add_output(&encoded)?;
    if let Some(dest) = wav_out {
        let kept = wav.persist_to(dest)?;
        report.add_output(&kept)?;
    }
    println!("{}", report.to_json()?);
    Ok(())
}

/// Render one layer on its own.
pub fn layer(config: SoundtrackConfig, kind: LayerKind, out: &Path) -> Result<()> {
    let renderer = Renderer::new(config)?;
    let layer = renderer.render_layer(kind)?;

    ensure_parent(out)?;
    let staged = ScopedArtifact::staging_for(out);
    export_wav(layer.buffer(), staged.path(), renderer.config().export)?;
    let out = staged.persist_to(out)?;

    println!(
        "Layer '{}': {:.2}s, peak {:.3} -> {}",
        layer.name(),
        layer.buffer().duration_secs(),
        layer.buffer().peak(),
        out.display()
    );
    Ok(())
}

/// List the available layers.
pub fn list_layers() -> Result<()> {
    println!("{:<12}{:<12}{:>8}", "LAYER", "FAMILY", "GAIN");
    println!("{:-<32}", "");
    for kind in LayerKind::ALL {
        println!(
            "{:<12}{:<12}{:>8.2}",
            kind.name(),
            format!("{:?}", kind.family()).to_lowercase(),
            kind.default_gain()
        );
    }
    Ok(())
}

/// Print a quality report for an existing WAV file.
pub fn analyze_file(wav: &Path) -> Result<()> {
    info!("Analyzing {}", wav.display());
    let buffer = import_wav(wav)?;
    let report = analyze(&buffer);

    println!("{}", serde_json::to_string_pretty(&report)?);
    for issue in report.issues() {
        log::warn!("{}", issue);
    }
    Ok(())
}
