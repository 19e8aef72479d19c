//! Audio Engine Module
//!
//! Core audio plumbing shared by every stage:
//! - Mono audio buffer and level helpers
//! - WAV file I/O

pub mod buffer;
pub mod io;

pub use buffer::{sample_count, AudioBuffer, DEFAULT_SAMPLE_RATE, FULL_SCALE, MIN_SAMPLE_RATE};
pub use io::{export_wav, import_wav, ExportFormat};
