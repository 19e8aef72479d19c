//! Signal building blocks for the layer generators
//!
//! - Envelope shaping (piecewise-linear, ADSR, fades)
//! - Biquad filters for band-limiting noise
//! - Oscillators and additive tones

pub mod envelope;
pub mod filter;
pub mod oscillator;

pub use envelope::{Adsr, ControlPoint, Envelope, CLICK_THRESHOLD};
pub use filter::{Biquad, FilterChain, FilterType};
pub use oscillator::{additive, render_tone, transpose, Partial, Waveform};
