//! Biquad filters for shaping noise
//!
//! Second-order sections from the Audio EQ Cookbook, used to band-limit
//! the noise behind the texture and percussion layers.

use std::f64::consts::PI;

/// Pole-pair Q values of a sixth-order Butterworth response
const BUTTERWORTH_6_Q: [f64; 3] = [
    0.517_638_090_205_041_5,
    std::f64::consts::FRAC_1_SQRT_2,
    1.931_851_652_578_136_6,
];

/// Filter response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Remove above frequency
    LowPass,
    /// Remove below frequency
    HighPass,
    /// Keep a band around the centre frequency (0 dB peak)
    BandPass,
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (a0 + a1*z^-1 + a2*z^-2)
/// Normalized: all coefficients divided by a0
#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Calculate biquad coefficients using Audio EQ Cookbook formulas
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    fn calculate(filter_type: FilterType, sample_rate: f64, frequency: f64, q: f64) -> Self {
        // Keep below Nyquist; the Nyquist bound wins at very low rates
        let freq = frequency.max(10.0).min(sample_rate / 2.0 - 1.0).max(f64::EPSILON);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2) = match filter_type {
            FilterType::LowPass => ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0),
            FilterType::HighPass => ((1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0),
            FilterType::BandPass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Single biquad section with its own state
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new(filter_type: FilterType, sample_rate: u32, frequency: f64, q: f64) -> Self {
        Self {
            coeffs: BiquadCoeffs::calculate(filter_type, sample_rate as f64, frequency, q),
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Butterworth low-pass (Q = 1/sqrt(2))
    pub fn low_pass(sample_rate: u32, frequency: f64) -> Self {
        Self::new(FilterType::LowPass, sample_rate, frequency, std::f64::consts::FRAC_1_SQRT_2)
    }

    /// Butterworth high-pass (Q = 1/sqrt(2))
    pub fn high_pass(sample_rate: u32, frequency: f64) -> Self {
        Self::new(FilterType::HighPass, sample_rate, frequency, std::f64::consts::FRAC_1_SQRT_2)
    }

    /// Band-pass between two corner frequencies
    pub fn band_pass(sample_rate: u32, low_hz: f64, high_hz: f64) -> Self {
        let center = (low_hz * high_hz).sqrt();
        let q = center / (high_hz - low_hz).max(1.0);
        Self::new(FilterType::BandPass, sample_rate, center, q)
    }

    /// Process a single sample (Direct Form I)
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let x = input as f64;
        let c = &self.coeffs;
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y as f32
    }

    /// Filter a slice in place
    pub fn process_slice(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    /// Clear filter history
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Biquad sections run in series
#[derive(Debug, Clone)]
pub struct FilterChain {
    sections: Vec<Biquad>,
}

impl FilterChain {
    /// Sixth-order Butterworth high-pass (36 dB/octave below `frequency`)
    pub fn butterworth_high_pass(sample_rate: u32, frequency: f64) -> Self {
        let sections = BUTTERWORTH_6_Q
            .iter()
            .map(|&q| Biquad::new(FilterType::HighPass, sample_rate, frequency, q))
            .collect();
        Self { sections }
    }

    /// Filter a slice in place through every section
    pub fn process_slice(&mut self, samples: &mut [f32]) {
        for section in &mut self.sections {
            section.process_slice(samples);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, sample_rate: u32, num_samples: usize) -> Vec<f32> {
        let w = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
        (0..num_samples).map(|i| (w * i as f32).sin()).collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_low_pass_attenuates_highs() {
        let sr = 44100;
        let mut low = sine(100.0, sr, 44100);
        let mut high = sine(8000.0, sr, 44100);
        let mut lp = Biquad::low_pass(sr, 800.0);
        lp.process_slice(&mut low);
        lp.reset();
        lp.process_slice(&mut high);

        // Skip the settling transient
        assert!(rms(&low[4410..]) > 0.6);
        assert!(rms(&high[4410..]) < 0.05);
    }

    #[test]
    fn test_high_pass_attenuates_lows() {
        let sr = 44100;
        let mut low = sine(50.0, sr, 44100);
        let mut lp = Biquad::high_pass(sr, 2000.0);
        lp.process_slice(&mut low);
        assert!(rms(&low[4410..]) < 0.01);
    }

    #[test]
    fn test_tiny_sample_rate_stays_finite() {
        // Corner frequencies far above Nyquist fold down instead of panicking
        for sr in [1, 2, 16, 40] {
            let mut samples = sine(3.0, sr, 64);
            Biquad::band_pass(sr, 500.0, 3000.0).process_slice(&mut samples);
            Biquad::low_pass(sr, 800.0).process_slice(&mut samples);
            assert!(samples.iter().all(|s| s.is_finite()), "sr {}", sr);
        }
    }

    #[test]
    fn test_sixth_order_high_pass_is_steep() {
        let sr = 44100;
        let mut below = sine(100.0, sr, 44100);
        let mut above = sine(1000.0, sr, 44100);
        let mut chain = FilterChain::butterworth_high_pass(sr, 200.0);
        chain.process_slice(&mut below);
        let mut chain = FilterChain::butterworth_high_pass(sr, 200.0);
        chain.process_slice(&mut above);

        // One octave down is 36 dB under the passband
        assert!(rms(&below[4410..]) < 0.02);
        assert!(rms(&above[4410..]) > 0.69);
    }

    #[test]
    fn test_band_pass_keeps_center() {
        let sr = 44100;
        let mut center = sine(1224.0, sr, 44100);
        let mut bp = Biquad::band_pass(sr, 500.0, 3000.0);
        bp.process_slice(&mut center);
        assert!(rms(&center[4410..]) > 0.6);
    }
}
