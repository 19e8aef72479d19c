//! Magnitude spectra and the spectral measurements built on them
//!
//! All spectra are Hann-windowed and keep only the non-negative
//! frequency bins, `0..=n/2`.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;

use super::thresholds;
use crate::engine::AudioBuffer;

/// Magnitude spectrum of one block of samples
#[derive(Debug, Clone)]
pub struct Spectrum {
    magnitudes: Vec<f64>,
    bin_hz: f64,
    sample_rate: u32,
}

impl Spectrum {
    /// Spectrum of a whole buffer in one FFT
    pub fn of(buffer: &AudioBuffer) -> Self {
        Self::of_samples(buffer.samples(), buffer.sample_rate())
    }

    pub fn of_samples(samples: &[f32], sample_rate: u32) -> Self {
        let mut planner = FftPlanner::new();
        Self::with_planner(&mut planner, samples, sample_rate)
    }

    fn with_planner(planner: &mut FftPlanner<f64>, samples: &[f32], sample_rate: u32) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self {
                magnitudes: Vec::new(),
                bin_hz: 0.0,
                sample_rate,
            };
        }

        let fft = planner.plan_fft_forward(n);
        let mut bins: Vec<Complex<f64>> = samples
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let window = 0.5 * (1.0 - (std::f64::consts::TAU * i as f64 / n as f64).cos());
                Complex::new(s as f64 * window, 0.0)
            })
            .collect();
        fft.process(&mut bins);

        let scale = (n as f64 / 2.0).max(1.0);
        let magnitudes = bins.iter().take(n / 2 + 1).map(|c| c.norm() / scale).collect();

        Self {
            magnitudes,
            bin_hz: sample_rate as f64 / n as f64,
            sample_rate,
        }
    }

    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }

    /// Width of one bin in Hz
    pub fn bin_hz(&self) -> f64 {
        self.bin_hz
    }

    pub fn nyquist_hz(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    pub fn frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.bin_hz
    }

    /// Sum of magnitudes with `low_hz <= f <= high_hz`
    pub fn band_sum(&self, low_hz: f64, high_hz: f64) -> f64 {
        self.bin_range(low_hz, high_hz)
            .map(|range| self.magnitudes[range].iter().sum())
            .unwrap_or(0.0)
    }

    /// Mean magnitude over every bin
    pub fn mean_magnitude(&self) -> f64 {
        if self.magnitudes.is_empty() {
            0.0
        } else {
            self.magnitudes.iter().sum::<f64>() / self.magnitudes.len() as f64
        }
    }

    /// Frequencies of local maxima at least `min_fraction` of the largest bin
    ///
    /// The DC bin and the last bin are never peaks. Returned in ascending order.
    pub fn peaks(&self, min_fraction: f64) -> Vec<f64> {
        let max = self.magnitudes.iter().copied().fold(0.0, f64::max);
        if max <= 0.0 {
            return Vec::new();
        }
        let floor = max * min_fraction;
        self.magnitudes
            .windows(3)
            .enumerate()
            .filter(|(_, w)| w[1] >= floor && w[1] > w[0] && w[1] >= w[2])
            .map(|(i, _)| self.frequency(i + 1))
            .collect()
    }

    /// Loudest frequency with `low_hz < f < high_hz`, if that band is not silent
    pub fn dominant_in(&self, low_hz: f64, high_hz: f64) -> Option<f64> {
        let (bin, &magnitude) = self
            .magnitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let f = self.frequency(*i);
                f > low_hz && f < high_hz
            })
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        (magnitude > 0.0).then(|| self.frequency(bin))
    }

    fn bin_range(&self, low_hz: f64, high_hz: f64) -> Option<std::ops::RangeInclusive<usize>> {
        if self.magnitudes.is_empty() || high_hz < low_hz {
            return None;
        }
        let first = (low_hz.max(0.0) / self.bin_hz).ceil() as usize;
        let last = ((high_hz / self.bin_hz).floor() as usize).min(self.magnitudes.len() - 1);
        (first <= last).then_some(first..=last)
    }
}

// ============================================================================
// Warmth
// ============================================================================

/// Share of spectral magnitude (percent) in each tonal band
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BandShares {
    /// 20-80 Hz
    pub sub_bass: f32,
    /// 80-250 Hz
    pub warm_bass: f32,
    /// 250-500 Hz
    pub warm_mid: f32,
    /// 500-2000 Hz
    pub mid: f32,
    /// 2-6 kHz
    pub high_mid: f32,
    /// 6-12 kHz
    pub high: f32,
}

impl BandShares {
    pub fn measure(spectrum: &Spectrum) -> Self {
        let sums = [
            spectrum.band_sum(20.0, 80.0),
            spectrum.band_sum(80.0, 250.0),
            spectrum.band_sum(250.0, 500.0),
            spectrum.band_sum(500.0, 2000.0),
            spectrum.band_sum(2000.0, 6000.0),
            spectrum.band_sum(6000.0, 12000.0),
        ];
        let total: f64 = sums.iter().sum();
        if total <= 0.0 {
            return Self::default();
        }
        let pct = |v: f64| (v / total * 100.0) as f32;
        Self {
            sub_bass: pct(sums[0]),
            warm_bass: pct(sums[1]),
            warm_mid: pct(sums[2]),
            mid: pct(sums[3]),
            high_mid: pct(sums[4]),
            high: pct(sums[5]),
        }
    }

    /// Warm bass plus warm mid
    pub fn warmth(&self) -> f32 {
        self.warm_bass + self.warm_mid
    }
}

// ============================================================================
// Consonance
// ============================================================================

/// Frequency ratios heard as consonant: unison, octave, fifth, major third,
/// fourth, minor third
const CONSONANT_RATIOS: [f64; 6] = [1.0, 2.0, 1.5, 1.25, 1.33, 1.2];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consonance {
    pub consonant_pairs: usize,
    pub total_pairs: usize,
}

impl Consonance {
    /// Compare every pair among the lowest spectral peaks below
    /// `CONSONANCE_MAX_HZ`
    pub fn measure(spectrum: &Spectrum) -> Self {
        let peaks = spectrum.peaks(thresholds::PEAK_MIN_FRACTION);
        if peaks.len() < 2 {
            return Self {
                consonant_pairs: 0,
                total_pairs: 0,
            };
        }

        let musical: Vec<f64> = peaks
            .into_iter()
            .filter(|&f| f < thresholds::CONSONANCE_MAX_HZ)
            .take(thresholds::CONSONANCE_MAX_PEAKS)
            .collect();

        let mut consonant_pairs = 0;
        let mut total_pairs = 0;
        for (i, &a) in musical.iter().enumerate() {
            for &b in &musical[i + 1..] {
                total_pairs += 1;
                if is_consonant(a.max(b) / a.min(b)) {
                    consonant_pairs += 1;
                }
            }
        }

        Self {
            consonant_pairs,
            total_pairs,
        }
    }

    /// Share of consonant pairs; 1.0 when there is nothing to compare
    pub fn ratio(&self) -> f32 {
        if self.total_pairs == 0 {
            1.0
        } else {
            self.consonant_pairs as f32 / self.total_pairs as f32
        }
    }
}

fn is_consonant(ratio: f64) -> bool {
    CONSONANT_RATIOS.iter().any(|&cr| {
        (ratio - cr).abs() < thresholds::RATIO_TOLERANCE
            || (ratio - 2.0 * cr).abs() < thresholds::RATIO_TOLERANCE
    })
}

// ============================================================================
// Melodic movement
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MelodicContour {
    /// Dominant melodic-range frequency of each non-silent window
    pub pitches_hz: Vec<f64>,
}

impl MelodicContour {
    /// Track the loudest 200-2000 Hz bin across half-overlapping windows
    pub fn measure(buffer: &AudioBuffer) -> Self {
        let sr = buffer.sample_rate();
        let window = (thresholds::MELODY_WINDOW_SECS * sr as f64) as usize;
        let hop = window / 2;
        let samples = buffer.samples();
        if hop == 0 || samples.len() <= window {
            return Self {
                pitches_hz: Vec::new(),
            };
        }

        let mut planner = FftPlanner::new();
        let num_windows = (samples.len() - window) / hop;
        let pitches_hz = (0..num_windows)
            .filter_map(|i| {
                let start = i * hop;
                Spectrum::with_planner(&mut planner, &samples[start..start + window], sr)
                    .dominant_in(thresholds::MELODY_LOW_HZ, thresholds::MELODY_HIGH_HZ)
            })
            .collect();

        Self { pitches_hz }
    }

    /// Enough windows carried a pitch to judge the contour
    pub fn is_measurable(&self) -> bool {
        self.pitches_hz.len() >= thresholds::MELODY_MIN_WINDOWS
    }

    /// Window-to-window steps larger than `PITCH_STEP_HZ`
    pub fn pitch_changes(&self) -> usize {
        self.pitches_hz
            .windows(2)
            .filter(|w| (w[1] - w[0]).abs() > thresholds::PITCH_STEP_HZ)
            .count()
    }

    /// Population standard deviation of the tracked pitches
    pub fn pitch_std_hz(&self) -> f64 {
        let n = self.pitches_hz.len();
        if n == 0 {
            return 0.0;
        }
        let mean = self.pitches_hz.iter().sum::<f64>() / n as f64;
        let variance = self.pitches_hz.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n as f64;
        variance.sqrt()
    }
}

// ============================================================================
// Fullness
// ============================================================================

/// Count of active 50 Hz bands between 50 Hz and 2 kHz
pub fn active_bands(spectrum: &Spectrum) -> usize {
    let floor = spectrum.mean_magnitude() * thresholds::ACTIVE_BAND_MEAN_MULTIPLE;
    (1..=thresholds::FULLNESS_BANDS)
        .map(|i| {
            let low = thresholds::FULLNESS_BAND_HZ * i as f64;
            spectrum.band_sum(low, low + thresholds::FULLNESS_BAND_HZ)
        })
        .filter(|&sum| sum > floor)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn tones(freqs: &[f64], secs: f64, sr: u32) -> Vec<f32> {
        let n = (secs * sr as f64) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / sr as f64;
                let sum: f64 = freqs.iter().map(|f| (std::f64::consts::TAU * f * t).sin()).sum();
                (0.3 * sum) as f32
            })
            .collect()
    }

    #[test]
    fn test_sine_lands_in_its_bin() {
        let spectrum = Spectrum::of_samples(&tones(&[440.0], 1.0, 8000), 8000);
        assert_eq!(spectrum.magnitudes().len(), 4001);
        assert_relative_eq!(spectrum.bin_hz(), 1.0);
        assert_eq!(spectrum.peaks(0.1), vec![440.0]);
        assert_eq!(spectrum.dominant_in(200.0, 2000.0), Some(440.0));
        // Hann main lobe: half the peak on each side
        let mags = spectrum.magnitudes();
        assert_relative_eq!(mags[439], mags[440] / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_band_sum_is_inclusive() {
        let spectrum = Spectrum::of_samples(&tones(&[250.0], 1.0, 8000), 8000);
        let at_edge = spectrum.band_sum(80.0, 250.0);
        assert!(at_edge > 0.0);
        let total = spectrum.band_sum(0.0, 4000.0);
        assert_relative_eq!(at_edge + spectrum.band_sum(251.0, 500.0), total, epsilon = 1e-4);
        assert_eq!(spectrum.band_sum(500.0, 100.0), 0.0);
    }

    #[test]
    fn test_empty_spectrum() {
        let spectrum = Spectrum::of_samples(&[], 44100);
        assert!(spectrum.peaks(0.1).is_empty());
        assert_eq!(spectrum.band_sum(0.0, 1000.0), 0.0);
        assert_eq!(spectrum.mean_magnitude(), 0.0);
        assert_eq!(spectrum.dominant_in(200.0, 2000.0), None);
    }

    #[test]
    fn test_warm_tones_fill_warm_bands() {
        let spectrum = Spectrum::of_samples(&tones(&[100.0, 350.0], 1.0, 44100), 44100);
        let shares = BandShares::measure(&spectrum);
        assert_relative_eq!(shares.warm_bass, 50.0, epsilon = 1.0);
        assert_relative_eq!(shares.warm_mid, 50.0, epsilon = 1.0);
        assert!(shares.high < 0.1);
        assert!(shares.warmth() > 99.0);
    }

    #[test]
    fn test_white_noise_is_bright() {
        let mut rng = StdRng::seed_from_u64(5);
        let noise: Vec<f32> = (0..44100).map(|_| rng.gen_range(-0.5..0.5)).collect();
        let spectrum = Spectrum::of_samples(&noise, 44100);
        let shares = BandShares::measure(&spectrum);
        // Flat spectrum: share tracks bandwidth, 6000 of 11980 Hz
        assert!(shares.high > 40.0, "{:?}", shares);
        assert!(shares.warm_bass < 5.0);
        assert_eq!(active_bands(&spectrum), thresholds::FULLNESS_BANDS);
    }

    #[test]
    fn test_major_triad_is_consonant() {
        let spectrum = Spectrum::of_samples(&tones(&[200.0, 250.0, 300.0], 1.0, 44100), 44100);
        let consonance = Consonance::measure(&spectrum);
        assert_eq!(consonance.total_pairs, 3);
        assert_eq!(consonance.consonant_pairs, 3);
        assert_relative_eq!(consonance.ratio(), 1.0);
    }

    #[test]
    fn test_minor_seventh_is_dissonant() {
        // 7:4 sits 0.25 from both the fifth and the octave
        let spectrum = Spectrum::of_samples(&tones(&[200.0, 350.0], 1.0, 44100), 44100);
        let consonance = Consonance::measure(&spectrum);
        assert_eq!(consonance.total_pairs, 1);
        assert_eq!(consonance.consonant_pairs, 0);
        assert_eq!(consonance.ratio(), 0.0);
    }

    #[test]
    fn test_single_tone_has_nothing_to_compare() {
        let spectrum = Spectrum::of_samples(&tones(&[440.0], 1.0, 8000), 8000);
        let consonance = Consonance::measure(&spectrum);
        assert_eq!(consonance.total_pairs, 0);
        assert_relative_eq!(consonance.ratio(), 1.0);
    }

    #[test]
    fn test_stepped_melody_moves() {
        let sr = 8000;
        let samples: Vec<f32> = [300.0, 500.0, 700.0, 400.0, 600.0, 800.0]
            .iter()
            .flat_map(|&f| tones(&[f], 0.5, sr))
            .collect();
        let contour = MelodicContour::measure(&AudioBuffer::from_samples(samples, sr));

        // 3 s in 0.25 s windows every 0.125 s
        assert_eq!(contour.pitches_hz.len(), 22);
        assert!(contour.is_measurable());
        assert!(contour.pitch_changes() > thresholds::MIN_PITCH_CHANGES);
        assert!(contour.pitch_std_hz() > thresholds::PITCH_STD_MIN_HZ);
    }

    #[test]
    fn test_steady_tone_has_no_melody() {
        let steady = AudioBuffer::from_samples(tones(&[440.0], 2.0, 8000), 8000);
        let contour = MelodicContour::measure(&steady);
        assert!(contour.is_measurable());
        assert_eq!(contour.pitch_changes(), 0);
        assert!(contour.pitch_std_hz() < 1.0);
    }

    #[test]
    fn test_silence_has_no_contour() {
        let contour = MelodicContour::measure(&AudioBuffer::new(16000, 8000));
        assert!(contour.pitches_hz.is_empty());
        assert!(!contour.is_measurable());
    }
}
