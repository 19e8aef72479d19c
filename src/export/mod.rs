//! Exporter/Muxer Bridge
//!
//! The only part of the crate that touches the filesystem beyond plain WAV
//! export, and the only external-process boundary.

pub mod artifact;
pub mod mux;

pub use artifact::{ensure_parent, file_checksum, ScopedArtifact};
pub use mux::{MuxOutcome, MuxRequest, Muxer, ToolOutput, ToolRunner};
