//! JSON run summary printed by the CLI

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::analysis::{analyze, QualityReport};
use crate::error::Result;
use crate::export::{file_checksum, MuxOutcome};
use crate::mix::{MixReport, Seam};
use crate::pipeline::FinalTrack;

/// A file the run wrote, with its checksum
#[derive(Debug, Clone, Serialize)]
pub struct OutputFile {
    pub path: PathBuf,
    pub sha256: String,
}

impl OutputFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            sha256: file_checksum(path)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub seed: u64,
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub samples: usize,
    pub peak: f32,
    pub layers: Vec<String>,
    pub truncated: bool,
    pub seams: Vec<Seam>,
    pub mix: MixReport,
    pub quality: QualityReport,
    pub outputs: Vec<OutputFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mux: Option<MuxOutcome>,
}

impl RunReport {
    pub fn new(command: impl Into<String>, track: &FinalTrack) -> Self {
        let buffer = track.buffer();
        Self {
            run_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            command: command.into(),
            seed: track.seed(),
            sample_rate: buffer.sample_rate(),
            duration_secs: buffer.duration_secs(),
            samples: buffer.len(),
            peak: buffer.peak(),
            layers: track.layers().iter().map(|k| k.name().to_string()).collect(),
            truncated: track.truncated(),
            seams: track.seams().to_vec(),
            mix: track.mix_report().clone(),
            quality: analyze(buffer),
            outputs: Vec::new(),
            mux: None,
        }
    }

    /// Record a written file and its checksum
    pub fn add_output(&mut self, path: &Path) -> Result<()> {
        self.outputs.push(OutputFile::from_path(path)?);
        Ok(())
    }

    pub fn with_mux(mut self, outcome: MuxOutcome) -> Self {
        self.mux = Some(outcome);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SoundtrackConfig;
    use crate::engine::ExportFormat;
    use crate::pipeline::Renderer;

    #[test]
    fn test_report_lists_outputs_with_checksums() {
        let config = SoundtrackConfig {
            sample_rate: 8000,
            target_duration_secs: 1.0,
            ..SoundtrackConfig::default()
        };
        let track = Renderer::new(config).unwrap().render().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        track.export_wav(&path, ExportFormat::default()).unwrap();

        let mut report = RunReport::new("render", &track);
        report.add_output(&path).unwrap();
        assert_eq!(report.samples, 8000);
        assert_eq!(report.outputs[0].sha256.len(), 64);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["command"], "render");
        assert_eq!(json["layers"].as_array().unwrap().len(), 8);
        assert!(json.get("mux").is_none());
        assert!(Uuid::parse_str(json["run_id"].as_str().unwrap()).is_ok());
    }
}
