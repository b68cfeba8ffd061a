//! Diagnostics - Settings Integrity Checking
//!
//! Validates a settings tree before the pipeline starts and reports issues
//! (errors/warnings) to the user instead of failing deep inside a tick.

use crate::config::AnalysisSettings;

/// Severity level of a diagnostic issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Critical problem that prevents proper functioning
    Error,
    /// Potential issue or suboptimal configuration
    Warning,
    /// Informational message
    Info,
}

/// A problem found in a settings tree
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    /// Severity level of the issue
    pub severity: IssueSeverity,
    /// Human-readable description
    pub message: String,
}

impl ConfigIssue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            message: message.into(),
        }
    }
}

/// Check a settings tree for structural and logical problems.
///
/// Checks performed:
/// 1. Band tables: positive, ordered, non-overlapping ranges
/// 2. Beat detector: sane thresholds and window sizes
/// 3. Events: fairness floor intact, adaptation rates in range
/// 4. Latency: calibration tone analyzable at the configured sample rate
pub fn check_settings(settings: &AnalysisSettings) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    check_band_table(&mut issues, "bands", settings);
    check_fine_table(&mut issues, settings);

    // Spectrum
    if !settings.spectrum.fft_size.is_power_of_two() {
        issues.push(ConfigIssue::error(format!(
            "FFT size {} is not a power of two",
            settings.spectrum.fft_size
        )));
    }
    if !(0.0..1.0).contains(&settings.spectrum.overlap) {
        issues.push(ConfigIssue::error(format!(
            "Overlap {} outside [0, 1)",
            settings.spectrum.overlap
        )));
    }

    // Beat detector
    if settings.beat.energy_ratio <= 1.0 {
        issues.push(ConfigIssue::warning(format!(
            "Beat energy ratio {} <= 1.0 will fire on nearly every frame",
            settings.beat.energy_ratio
        )));
    }
    if settings.beat.refractory_ms <= 0.0 {
        issues.push(ConfigIssue::error("Beat refractory window must be positive"));
    }
    if settings.beat.baseline_window == 0 || settings.beat.energy_history == 0 {
        issues.push(ConfigIssue::error("Beat history windows must be non-zero"));
    }
    if settings.beat.bpm_min >= settings.beat.bpm_max {
        issues.push(ConfigIssue::error(format!(
            "BPM clamp range [{}, {}] is empty",
            settings.beat.bpm_min, settings.beat.bpm_max
        )));
    }

    // Events
    if settings.events.min_telegraph_ms < 3000.0 {
        issues.push(ConfigIssue::error(format!(
            "Telegraph floor {} ms violates the 3000 ms fairness guarantee",
            settings.events.min_telegraph_ms
        )));
    }
    if settings.events.difficulty_min > settings.events.difficulty_max {
        issues.push(ConfigIssue::error("Difficulty bounds are inverted"));
    }
    if !(0.0..=1.0).contains(&settings.events.difficulty_step) {
        issues.push(ConfigIssue::error(format!(
            "Difficulty step {} outside (0, 1]",
            settings.events.difficulty_step
        )));
    }
    for action in &settings.events.actions {
        if action.threshold <= 0.0 {
            issues.push(ConfigIssue::error(format!(
                "Band {:?} has non-positive spawn threshold",
                action.band
            )));
        }
        if action.quadrant > 4 {
            issues.push(ConfigIssue::error(format!(
                "Band {:?} targets quadrant {} (valid: 0-4)",
                action.band, action.quadrant
            )));
        }
    }

    // Latency
    if !(0.0..=1.0).contains(&settings.latency.learning_rate) {
        issues.push(ConfigIssue::error(format!(
            "Latency learning rate {} outside (0, 1]",
            settings.latency.learning_rate
        )));
    }
    if settings.latency.max_offset_ms <= 0.0 {
        issues.push(ConfigIssue::error("Latency offset bound must be positive"));
    }
    let nyquist = settings.spectrum.sample_rate as f32 / 2.0;
    if settings.latency.tone_hz >= nyquist {
        issues.push(ConfigIssue::error(format!(
            "Calibration tone {} Hz is above nyquist ({} Hz)",
            settings.latency.tone_hz, nyquist
        )));
    }

    issues
}

fn check_band_table(issues: &mut Vec<ConfigIssue>, name: &str, settings: &AnalysisSettings) {
    let table = &settings.bands;
    if table.is_empty() {
        issues.push(ConfigIssue::error(format!("Band table `{name}` is empty")));
        return;
    }
    for band in &table.bands {
        if band.min_hz < 0.0 || band.max_hz <= band.min_hz {
            issues.push(ConfigIssue::error(format!(
                "Band {:?} range [{}, {}] is invalid",
                band.id, band.min_hz, band.max_hz
            )));
        }
    }
    for pair in table.bands.windows(2) {
        if pair[1].min_hz < pair[0].max_hz {
            issues.push(ConfigIssue::error(format!(
                "Bands {:?} and {:?} overlap",
                pair[0].id, pair[1].id
            )));
        }
    }
}

fn check_fine_table(issues: &mut Vec<ConfigIssue>, settings: &AnalysisSettings) {
    let nyquist = settings.spectrum.sample_rate as f32 / 2.0;
    for band in &settings.fine_bands.bands {
        if band.min_hz >= nyquist {
            issues.push(ConfigIssue::warning(format!(
                "Fine band {:?} starts above nyquist and will always read zero",
                band.id
            )));
        }
    }
}
