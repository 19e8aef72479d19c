//! Error handling for Hearthtone
//!
//! Every stage fails fast: bad parameters are never clamped or corrected,
//! and synthesis is deterministic so nothing here is retried except a
//! transient launch failure of the external muxing tool.

use std::fmt;

use thiserror::Error;

/// Result type alias for Hearthtone operations
pub type Result<T> = std::result::Result<T, HearthError>;

/// Why a call to the external muxing tool failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxFailure {
    /// The tool binary could not be found on disk or in PATH
    ToolNotFound,
    /// The tool exists but is not executable
    NotExecutable,
    /// The tool exists but the process could not be started
    Launch,
    /// The tool ran and exited unsuccessfully (code is None when killed by a signal)
    ExitStatus(Option<i32>),
    /// The tool did not finish within the configured timeout and was killed
    TimedOut,
    /// The tool reported success but the output file is missing or empty
    MissingOutput,
}

impl fmt::Display for MuxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxFailure::ToolNotFound => write!(f, "tool not found"),
            MuxFailure::NotExecutable => write!(f, "tool not executable"),
            MuxFailure::Launch => write!(f, "launch failed"),
            MuxFailure::ExitStatus(Some(code)) => write!(f, "exit status {}", code),
            MuxFailure::ExitStatus(None) => write!(f, "terminated by signal"),
            MuxFailure::TimedOut => write!(f, "timed out"),
            MuxFailure::MissingOutput => write!(f, "missing or empty output"),
        }
    }
}

/// Main error type for Hearthtone operations
#[derive(Error, Debug)]
pub enum HearthError {
    // Parameter Errors
    #[error("Invalid parameter '{param}': got {value}, expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Synthesis Errors
    #[error("Synthesis failed for layer '{layer}': {reason}")]
    Synthesis { layer: String, reason: String },

    // External Tool Errors
    #[error("Mux failed ({kind}): {diagnostics}")]
    Mux {
        kind: MuxFailure,
        diagnostics: String,
    },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HearthError {
    /// Shorthand for an [`HearthError::InvalidParameter`]
    pub fn invalid(
        param: impl Into<String>,
        value: impl fmt::Display,
        expected: impl Into<String>,
    ) -> Self {
        HearthError::InvalidParameter {
            param: param.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Shorthand for a [`HearthError::Synthesis`]
    pub fn synthesis(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        HearthError::Synthesis {
            layer: layer.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`HearthError::Mux`]
    pub fn mux(kind: MuxFailure, diagnostics: impl Into<String>) -> Self {
        HearthError::Mux {
            kind,
            diagnostics: diagnostics.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            HearthError::InvalidParameter { .. } => "INVALID_PARAMETER",
            HearthError::Synthesis { .. } => "SYNTHESIS_ERROR",
            HearthError::Mux { .. } => "MUX_ERROR",
            HearthError::FileNotFound { .. } => "FILE_NOT_FOUND",
            HearthError::Wav(_) => "WAV_ERROR",
            HearthError::Io(_) => "IO_ERROR",
            HearthError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if retrying the same operation could succeed
    ///
    /// Only a failed launch of an existing tool qualifies. A missing tool,
    /// a non-zero exit and every synthesis failure are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HearthError::Mux {
                kind: MuxFailure::Launch,
                ..
            }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            HearthError::InvalidParameter { .. } => vec![
                "Check durations and sample rate are positive",
                "Run 'hearthtone-cli layers' to list valid layer names",
                "Gains must be zero or positive",
            ],
            HearthError::Mux {
                kind: MuxFailure::ToolNotFound,
                ..
            } => vec![
                "Install ffmpeg or pass --tool with its full path",
                "The rendered WAV can still be written with 'hearthtone-cli render'",
            ],
            HearthError::Mux {
                kind: MuxFailure::TimedOut,
                ..
            } => vec!["Raise --timeout for long or high-resolution videos"],
            HearthError::Mux {
                kind: MuxFailure::NotExecutable,
                ..
            } => vec!["Check the tool path points at an executable file"],
            HearthError::Mux { .. } => vec![
                "Check the silent video plays in another application",
                "Inspect the tool diagnostics above",
            ],
            HearthError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Record the silent video before muxing",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = HearthError::invalid("gain", -1.0, ">= 0");
        assert_eq!(err.error_code(), "INVALID_PARAMETER");

        let err = HearthError::synthesis("pad", "no samples");
        assert_eq!(err.error_code(), "SYNTHESIS_ERROR");

        let err = HearthError::mux(MuxFailure::ExitStatus(Some(1)), "boom");
        assert_eq!(err.error_code(), "MUX_ERROR");
    }

    #[test]
    fn test_only_launch_failures_are_transient() {
        assert!(HearthError::mux(MuxFailure::Launch, "EAGAIN").is_transient());
        assert!(!HearthError::mux(MuxFailure::ToolNotFound, "").is_transient());
        assert!(!HearthError::mux(MuxFailure::NotExecutable, "").is_transient());
        assert!(!HearthError::mux(MuxFailure::ExitStatus(Some(1)), "").is_transient());
        assert!(!HearthError::synthesis("wind", "nan").is_transient());
    }

    #[test]
    fn test_mux_message_carries_diagnostics() {
        let err = HearthError::mux(MuxFailure::ExitStatus(Some(1)), "Invalid data found");
        let message = err.to_string();
        assert!(message.contains("exit status 1"));
        assert!(message.contains("Invalid data found"));
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = HearthError::mux(MuxFailure::ToolNotFound, "ffmpeg");
        assert!(!err.recovery_suggestions().is_empty());
    }
}
