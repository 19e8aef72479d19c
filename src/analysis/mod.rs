//! Quality analysis of a rendered track
//!
//! Time-domain measurements catch clipping, a flat or spiky dynamic
//! profile, and abrupt jumps in the loudness envelope. Spectral
//! measurements ([`spectrum`]) judge warmth, consonance, melodic movement
//! and fullness.

pub mod spectrum;

use serde::Serialize;

use crate::engine::buffer::linear_to_db;
use crate::engine::AudioBuffer;

pub use spectrum::{BandShares, Spectrum};
use spectrum::{active_bands, Consonance, MelodicContour};

/// Analysis thresholds
pub mod thresholds {
    /// Absolute level counted as a clipped sample
    pub const CLIP_LEVEL: f32 = 0.999;

    /// Crest factor range (dB) of a gentle, even mix
    pub const CREST_MIN_DB: f32 = 3.0;
    pub const CREST_MAX_DB: f32 = 12.0;

    /// Quietest acceptable RMS level
    pub const RMS_MIN: f32 = 0.08;

    /// Envelope steps larger than this many standard deviations are harsh
    pub const HARSH_STD_MULTIPLE: f64 = 4.0;

    /// Largest tolerated share of harsh envelope steps
    pub const HARSH_RATIO_MAX: f32 = 0.01;

    /// Block length of the loudness envelope (seconds)
    pub const ENVELOPE_BLOCK_SECS: f64 = 0.01;

    // Warmth, as percent of the 20 Hz - 12 kHz magnitude
    pub const WARM_BASS_MIN_PCT: f32 = 25.0;
    pub const BODY_MIN_PCT: f32 = 15.0;
    pub const HIGH_MAX_PCT: f32 = 10.0;
    pub const HIGH_MID_MAX_PCT: f32 = 20.0;
    pub const WARMTH_MIN_PCT: f32 = 45.0;

    /// Spectral peaks must reach this fraction of the largest bin
    pub const PEAK_MIN_FRACTION: f64 = 0.1;
    /// Only peaks below this are compared for consonance
    pub const CONSONANCE_MAX_HZ: f64 = 2000.0;
    /// Lowest peaks compared pairwise
    pub const CONSONANCE_MAX_PEAKS: usize = 10;
    /// Distance from a consonant ratio still counted as a match
    pub const RATIO_TOLERANCE: f64 = 0.1;
    pub const CONSONANCE_MIN: f32 = 0.3;

    /// Melody tracking window (seconds), advanced by half its length
    pub const MELODY_WINDOW_SECS: f64 = 0.25;
    /// Melodic range, both bounds exclusive
    pub const MELODY_LOW_HZ: f64 = 200.0;
    pub const MELODY_HIGH_HZ: f64 = 2000.0;
    /// Fewest pitched windows needed to judge the melody
    pub const MELODY_MIN_WINDOWS: usize = 3;
    /// Smallest pitch step counted as movement
    pub const PITCH_STEP_HZ: f64 = 20.0;
    /// A melody needs more steps than this
    pub const MIN_PITCH_CHANGES: usize = 3;
    pub const PITCH_STD_MIN_HZ: f64 = 50.0;

    /// Fullness bands: `FULLNESS_BANDS` bands of `FULLNESS_BAND_HZ` from 50 Hz
    pub const FULLNESS_BAND_HZ: f64 = 50.0;
    pub const FULLNESS_BANDS: usize = 39;
    /// A band is active when its magnitude sum exceeds this multiple of the
    /// mean bin magnitude
    pub const ACTIVE_BAND_MEAN_MULTIPLE: f64 = 0.25;
    pub const FULLNESS_RATIO_MIN: f32 = 0.3;
    /// A rich spectrum has more active bands than this
    pub const MIN_ACTIVE_BANDS: usize = 10;
}

/// Pass/fail checks derived from the measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityChecks {
    // Dynamics
    pub not_clipped: bool,
    pub gentle_dynamics: bool,
    pub good_volume: bool,
    pub smooth_envelope: bool,
    // Warmth
    pub has_warm_bass: bool,
    pub has_body: bool,
    pub not_harsh: bool,
    pub gentle_highs: bool,
    pub warm_ratio: bool,
    // Harmony and melody
    pub mostly_consonant: bool,
    pub has_melody: bool,
    pub not_monotonous: bool,
    // Fullness
    pub sounds_full: bool,
    pub rich_spectrum: bool,
}

impl QualityChecks {
    fn all(&self) -> [bool; 14] {
        [
            self.not_clipped,
            self.gentle_dynamics,
            self.good_volume,
            self.smooth_envelope,
            self.has_warm_bass,
            self.has_body,
            self.not_harsh,
            self.gentle_highs,
            self.warm_ratio,
            self.mostly_consonant,
            self.has_melody,
            self.not_monotonous,
            self.sounds_full,
            self.rich_spectrum,
        ]
    }

    /// Number of checks that passed, out of 14
    pub fn score(&self) -> usize {
        self.all().iter().filter(|&&ok| ok).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub peak: f32,
    pub peak_db: f32,
    pub rms: f32,
    pub rms_db: f32,
    /// Peak over RMS in dB
    pub crest_factor_db: f32,
    pub dc_offset: f32,
    /// Share of samples at or above the clip level
    pub clip_ratio: f32,
    /// Share of envelope steps that count as harsh transients
    pub harsh_transient_ratio: f32,
    pub band_shares: BandShares,
    pub consonance_ratio: f32,
    pub consonant_pairs: usize,
    pub total_pairs: usize,
    /// Window-to-window melodic pitch steps
    pub pitch_changes: usize,
    pub pitch_std_hz: f64,
    /// Active 50 Hz bands between 50 Hz and 2 kHz
    pub active_bands: usize,
    pub fullness_ratio: f32,
    pub checks: QualityChecks,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.checks.all().iter().all(|&ok| ok)
    }

    /// Human-readable notes on every failed check
    pub fn issues(&self) -> Vec<String> {
        let checks = &self.checks;
        let shares = &self.band_shares;
        let mut issues = Vec::new();
        if !checks.not_clipped {
            issues.push(format!(
                "{:.2}% of samples clip; lower the layer gains",
                self.clip_ratio * 100.0
            ));
        }
        if !checks.gentle_dynamics {
            issues.push(format!(
                "crest factor {:.1} dB is outside {}-{} dB",
                self.crest_factor_db,
                thresholds::CREST_MIN_DB,
                thresholds::CREST_MAX_DB
            ));
        }
        if !checks.good_volume {
            issues.push(format!(
                "RMS {:.3} is below {}; raise the layer gains",
                self.rms,
                thresholds::RMS_MIN
            ));
        }
        if !checks.smooth_envelope {
            issues.push(format!(
                "{:.2}% harsh transients; soften attacks or use longer fades",
                self.harsh_transient_ratio * 100.0
            ));
        }
        if !checks.has_warm_bass || !checks.warm_ratio {
            issues.push(format!(
                "warm bass {:.1}% and warm mid {:.1}%; boost 80-500 Hz",
                shares.warm_bass, shares.warm_mid
            ));
        }
        if !checks.has_body {
            issues.push(format!(
                "warm mid {:.1}% is thin; add 250-500 Hz body",
                shares.warm_mid
            ));
        }
        if !checks.not_harsh || !checks.gentle_highs {
            issues.push(format!(
                "highs {:.1}% above 6 kHz, {:.1}% at 2-6 kHz; reduce brightness",
                shares.high, shares.high_mid
            ));
        }
        if !checks.mostly_consonant {
            issues.push(format!(
                "only {} of {} spectral peak pairs are consonant; avoid tritones and seconds",
                self.consonant_pairs, self.total_pairs
            ));
        }
        if !checks.has_melody || !checks.not_monotonous {
            issues.push(format!(
                "{} pitch changes, spread {:.0} Hz; add a clearer melody line",
                self.pitch_changes, self.pitch_std_hz
            ));
        }
        if !checks.sounds_full || !checks.rich_spectrum {
            issues.push(format!(
                "{} of {} bands active below 2 kHz; fill out the mid range",
                self.active_bands,
                thresholds::FULLNESS_BANDS
            ));
        }
        issues
    }
}

/// Measure `buffer`
pub fn analyze(buffer: &AudioBuffer) -> QualityReport {
    let samples = buffer.samples();
    let peak = buffer.peak();
    let rms = buffer.rms();

    let crest_factor_db = if rms > 0.0 && peak > 0.0 {
        linear_to_db(peak / rms)
    } else {
        0.0
    };

    let dc_offset = if samples.is_empty() {
        0.0
    } else {
        (samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64) as f32
    };

    let clipped = samples
        .iter()
        .filter(|s| s.abs() >= thresholds::CLIP_LEVEL)
        .count();
    let clip_ratio = ratio(clipped, samples.len());

    let harsh_transient_ratio = harsh_ratio(&block_envelope(buffer));

    let spectrum = Spectrum::of(buffer);
    let band_shares = BandShares::measure(&spectrum);
    let consonance = Consonance::measure(&spectrum);
    let contour = MelodicContour::measure(buffer);
    let pitch_changes = contour.pitch_changes();
    let pitch_std_hz = contour.pitch_std_hz();
    let active_bands = active_bands(&spectrum);
    let fullness_ratio = ratio(active_bands, thresholds::FULLNESS_BANDS);

    let checks = QualityChecks {
        not_clipped: clipped == 0,
        gentle_dynamics: (thresholds::CREST_MIN_DB..thresholds::CREST_MAX_DB)
            .contains(&crest_factor_db),
        good_volume: rms > thresholds::RMS_MIN,
        smooth_envelope: harsh_transient_ratio < thresholds::HARSH_RATIO_MAX,
        has_warm_bass: band_shares.warm_bass > thresholds::WARM_BASS_MIN_PCT,
        has_body: band_shares.warm_mid > thresholds::BODY_MIN_PCT,
        not_harsh: band_shares.high < thresholds::HIGH_MAX_PCT,
        gentle_highs: band_shares.high_mid < thresholds::HIGH_MID_MAX_PCT,
        warm_ratio: band_shares.warmth() > thresholds::WARMTH_MIN_PCT,
        mostly_consonant: consonance.ratio() > thresholds::CONSONANCE_MIN,
        has_melody: contour.is_measurable() && pitch_changes > thresholds::MIN_PITCH_CHANGES,
        not_monotonous: contour.is_measurable() && pitch_std_hz > thresholds::PITCH_STD_MIN_HZ,
        sounds_full: fullness_ratio > thresholds::FULLNESS_RATIO_MIN,
        rich_spectrum: active_bands > thresholds::MIN_ACTIVE_BANDS,
    };

    QualityReport {
        duration_secs: buffer.duration_secs(),
        sample_rate: buffer.sample_rate(),
        peak,
        peak_db: buffer.peak_db(),
        rms,
        rms_db: buffer.rms_db(),
        crest_factor_db,
        dc_offset,
        clip_ratio,
        harsh_transient_ratio,
        band_shares,
        consonance_ratio: consonance.ratio(),
        consonant_pairs: consonance.consonant_pairs,
        total_pairs: consonance.total_pairs,
        pitch_changes,
        pitch_std_hz,
        active_bands,
        fullness_ratio,
        checks,
    }
}

fn ratio(count: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        count as f32 / total as f32
    }
}

/// RMS of consecutive short blocks
fn block_envelope(buffer: &AudioBuffer) -> Vec<f64> {
    let block = ((thresholds::ENVELOPE_BLOCK_SECS * buffer.sample_rate() as f64).round() as usize)
        .max(1);
    buffer
        .samples()
        .chunks(block)
        .map(|chunk| {
            let energy: f64 = chunk.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (energy / chunk.len() as f64).sqrt()
        })
        .collect()
}

/// Share of envelope steps beyond `HARSH_STD_MULTIPLE` standard deviations
fn harsh_ratio(envelope: &[f64]) -> f32 {
    if envelope.len() < 2 {
        return 0.0;
    }
    let diffs: Vec<f64> = envelope.windows(2).map(|w| w[1] - w[0]).collect();
    let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let variance = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / diffs.len() as f64;
    let threshold = variance.sqrt() * thresholds::HARSH_STD_MULTIPLE;
    if threshold <= 0.0 {
        return 0.0;
    }
    let harsh = diffs.iter().filter(|d| d.abs() > threshold).count();
    ratio(harsh, diffs.len())
}
