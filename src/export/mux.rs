//! External Tool Bridge
//!
//! Invokes the audio/video tool (ffmpeg by default) as a blocking
//! subprocess with a bounded timeout. Every file the tool writes goes to a
//! staging path first and is renamed into place only after the tool exits
//! successfully and the file is non-empty.

use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::artifact::{ensure_parent, ScopedArtifact};
use crate::config::MuxSettings;
use crate::engine::{export_wav, AudioBuffer, ExportFormat};
use crate::error::{HearthError, MuxFailure, Result};

/// How often a running tool is checked for exit
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Diagnostics keep only the end of the tool's stderr
const DIAGNOSTIC_LINES: usize = 40;

/// How long to wait for stderr once the tool itself has exited
const STDERR_GRACE: Duration = Duration::from_millis(500);

// ============================================================================
// Tool Runner
// ============================================================================

/// Result of a successful tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs one external program with a timeout
#[derive(Debug, Clone)]
pub struct ToolRunner {
    program: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
}

impl ToolRunner {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the tool, retrying once if it could not be launched
    ///
    /// A missing tool, a non-zero exit or a timeout is returned immediately.
    ///
    /// # Errors
    /// * `Mux` - see [`MuxFailure`] for the possible causes
    pub fn run(&self, args: &[OsString]) -> Result<ToolOutput> {
        match self.run_once(args) {
            Err(e) if e.is_transient() => {
                log::warn!("{}; retrying once", e);
                self.run_once(args)
            }
            other => other,
        }
    }

    fn run_once(&self, args: &[OsString]) -> Result<ToolOutput> {
        log::debug!("Running {} {:?}", self.program.display(), args);
        let started = Instant::now();

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout also reaches whatever the tool spawned
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|e| self.launch_error(e))?;

        // Drain stderr on its own thread so a chatty tool cannot fill the pipe and stall.
        // A grandchild can hold the pipe open after the tool exits, so the
        // result is awaited with a deadline rather than joined.
        let stderr_pipe = child.stderr.take();
        let (stderr_tx, stderr_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut bytes = Vec::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut bytes);
            }
            let _ = stderr_tx.send(String::from_utf8_lossy(&bytes).into_owned());
        });

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                kill_process_tree(&mut child);
                let stderr = stderr_rx.recv_timeout(STDERR_GRACE).unwrap_or_default();
                return Err(HearthError::mux(
                    MuxFailure::TimedOut,
                    format!(
                        "{} killed after {:.1}s\n{}",
                        self.program.display(),
                        self.timeout.as_secs_f64(),
                        tail_lines(&stderr, DIAGNOSTIC_LINES)
                    ),
                ));
            }
            thread::sleep(self.poll_interval);
        };

        let stderr = stderr_rx.recv_timeout(STDERR_GRACE).unwrap_or_default();
        if !status.success() {
            return Err(HearthError::mux(
                MuxFailure::ExitStatus(status.code()),
                exit_diagnostics(&self.program, status, &stderr),
            ));
        }

        Ok(ToolOutput {
            stderr,
            elapsed: started.elapsed(),
        })
    }

    fn launch_error(&self, e: std::io::Error) -> HearthError {
        let kind = match e.kind() {
            ErrorKind::NotFound => MuxFailure::ToolNotFound,
            ErrorKind::PermissionDenied => MuxFailure::NotExecutable,
            _ => MuxFailure::Launch,
        };
        HearthError::mux(kind, format!("{}: {}", self.program.display(), e))
    }
}

/// Kill the tool and, on unix, every process in its group
fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let killed = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = killed {
            log::warn!("Could not signal process group {}: {}", group, e);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn exit_diagnostics(program: &Path, status: ExitStatus, stderr: &str) -> String {
    let tail = tail_lines(stderr, DIAGNOSTIC_LINES);
    if tail.is_empty() {
        format!("{} exited with {}", program.display(), status)
    } else {
        format!("{} exited with {}\n{}", program.display(), status, tail)
    }
}

fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let skip = lines.len().saturating_sub(max_lines);
    lines[skip..].join("\n")
}

// ============================================================================
// Muxer
// ============================================================================

/// Paths for one mux run
#[derive(Debug, Clone)]
pub struct MuxRequest {
    /// Silent video to take the picture from
    pub video: PathBuf,
    /// Final video with the soundtrack
    pub output: PathBuf,
    /// Where to keep the intermediate WAV; discarded when `None`
    pub audio_out: Option<PathBuf>,
}

impl MuxRequest {
    pub fn new(video: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            video: video.into(),
            output: output.into(),
            audio_out: None,
        }
    }

    pub fn with_audio_out(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_out = Some(path.into());
        self
    }
}

/// Files produced by a successful mux
#[derive(Debug, Clone, Serialize)]
pub struct MuxOutcome {
    pub output: PathBuf,
    pub output_bytes: u64,
    pub audio: Option<PathBuf>,
    pub elapsed_secs: f64,
}

/// Serializes tracks and hands them to the external tool
#[derive(Debug, Clone)]
pub struct Muxer {
    runner: ToolRunner,
    settings: MuxSettings,
}

impl Muxer {
    pub fn new(settings: MuxSettings) -> Self {
        let runner = ToolRunner::new(&settings.tool, Duration::from_secs(settings.timeout_secs));
        Self { runner, settings }
    }

    pub fn settings(&self) -> &MuxSettings {
        &self.settings
    }

    /// Arguments copying the video stream and encoding the new audio track
    pub fn mux_args(&self, video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            video.into(),
            "-i".into(),
            audio.into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            self.settings.audio_codec.as_str().into(),
            "-b:a".into(),
            self.settings.audio_bitrate.as_str().into(),
        ];
        if self.settings.shortest {
            args.push("-shortest".into());
        }
        args.push(output.into());
        args
    }

    /// Arguments transcoding a WAV to the compressed web format
    pub fn encode_args(&self, wav: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            wav.into(),
            "-codec:a".into(),
            self.settings.web_codec.as_str().into(),
            "-b:a".into(),
            self.settings.web_bitrate.as_str().into(),
            output.into(),
        ]
    }

    /// Write `track` to a WAV and mux it with the silent video
    ///
    /// On any failure neither the output nor the intermediate WAV is left
    /// on disk.
    ///
    /// # Errors
    /// * `FileNotFound` - the silent video does not exist
    /// * `Mux` - the tool is missing, fails, times out or writes nothing
    pub fn mux(
        &self,
        track: &AudioBuffer,
        request: &MuxRequest,
        format: ExportFormat,
    ) -> Result<MuxOutcome> {
        require_file(&request.video)?;

        let audio_dest = request
            .audio_out
            .clone()
            .unwrap_or_else(|| request.output.with_extension("wav"));
        ensure_parent(&audio_dest)?;
        let audio = ScopedArtifact::staging_for(&audio_dest);
        export_wav(track, audio.path(), format)?;

        let (output, tool) = self.produce(&request.output, |staged| {
            self.mux_args(&request.video, audio.path(), staged)
        })?;

        let audio = match &request.audio_out {
            Some(dest) => Some(audio.persist_to(dest)?),
            None => None,
        };

        log::info!("Muxed soundtrack into {}", output.display());
        Ok(MuxOutcome {
            output_bytes: fs::metadata(&output)?.len(),
            output,
            audio,
            elapsed_secs: tool.elapsed.as_secs_f64(),
        })
    }

    /// Mux an existing audio file with the silent video
    pub fn mux_files(&self, video: &Path, audio: &Path, output: &Path) -> Result<PathBuf> {
        require_file(video)?;
        require_file(audio)?;
        let (output, _) = self.produce(output, |staged| self.mux_args(video, audio, staged))?;
        log::info!("Muxed {} into {}", audio.display(), output.display());
        Ok(output)
    }

    /// Transcode a WAV to the compressed web format
    pub fn encode_audio(&self, wav: &Path, output: &Path) -> Result<PathBuf> {
        require_file(wav)?;
        let (output, _) = self.produce(output, |staged| self.encode_args(wav, staged))?;
        log::info!("Encoded {}", output.display());
        Ok(output)
    }

    /// Run the tool against a staging path and move the result to `output`
    fn produce<F>(&self, output: &Path, build_args: F) -> Result<(PathBuf, ToolOutput)>
    where
        F: FnOnce(&Path) -> Vec<OsString>,
    {
        ensure_parent(output)?;
        let staged = ScopedArtifact::staging_for(output);
        let tool = self.runner.run(&build_args(staged.path()))?;

        if !staged.is_non_empty() {
            return Err(HearthError::mux(
                MuxFailure::MissingOutput,
                format!(
                    "{} exited successfully but wrote nothing to {}\n{}",
                    self.runner.program().display(),
                    staged.path().display(),
                    tail_lines(&tool.stderr, DIAGNOSTIC_LINES)
                ),
            ));
        }

        let output = staged.persist_to(output)?;
        Ok((output, tool))
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(HearthError::FileNotFound {
            path: path.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mux_args_copy_video_and_encode_audio() {
        let muxer = Muxer::new(MuxSettings::default());
        let args = muxer.mux_args(
            Path::new("silent.mp4"),
            Path::new("track.wav"),
            Path::new("final.mp4"),
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-y", "-i", "silent.mp4", "-i", "track.wav", "-c:v", "copy", "-c:a", "aac",
                "-b:a", "320k", "-shortest", "final.mp4"
            ]
        );
    }

    #[test]
    fn test_shortest_flag_is_optional() {
        let settings = MuxSettings {
            shortest: false,
            ..MuxSettings::default()
        };
        let args = Muxer::new(settings).mux_args(
            Path::new("v.mp4"),
            Path::new("a.wav"),
            Path::new("o.mp4"),
        );
        assert!(!args.iter().any(|a| a == "-shortest"));
        assert_eq!(args.last().unwrap(), "o.mp4");
    }

    #[test]
    fn test_encode_args() {
        let muxer = Muxer::new(MuxSettings::default());
        let args = muxer.encode_args(Path::new("t.wav"), Path::new("t.mp3"));
        assert!(args.windows(2).any(|w| w[0] == "-codec:a" && w[1] == "libmp3lame"));
        assert!(args.windows(2).any(|w| w[0] == "-b:a" && w[1] == "192k"));
    }

    #[test]
    fn test_tail_lines_keeps_the_end() {
        let text = (1..=50).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&text, 3);
        assert_eq!(tail, "line 48\nline 49\nline 50");
        assert_eq!(tail_lines("", 3), "");
    }

    #[test]
    fn test_missing_tool_is_not_retried() {
        let runner = ToolRunner::new("/nonexistent/hearthtone-test-tool", Duration::from_secs(1));
        let err = runner.run(&[]).unwrap_err();
        assert!(matches!(
            err,
            HearthError::Mux {
                kind: MuxFailure::ToolNotFound,
                ..
            }
        ));
        assert!(!err.is_transient());
    }
}
