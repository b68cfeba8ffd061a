//! Analysis settings
//!
//! Aggregates every tunable constant of the core behind one serializable
//! struct. Nothing in the analysis path reads a bare literal; tests and
//! deployments override values here and persist them as TOML.

use crate::audio::spectrum::SpectrumConfig;
use crate::audio::synthetic::SyntheticConfig;
use crate::bands::BandTable;
use crate::beat::BeatConfig;
use crate::coherence::CoherenceConfig;
use crate::events::EventConfig;
use crate::latency::LatencyConfig;
use crate::logging::LogConfig;
use crate::sink::SinkConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Top-level settings for the whole analysis core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// FFT front-end
    #[serde(default)]
    pub spectrum: SpectrumConfig,
    /// Synthetic fallback generator
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    /// Primary (coarse) band table
    #[serde(default)]
    pub bands: BandTable,
    /// Fine band table for internal analysis
    #[serde(default = "BandTable::fine")]
    pub fine_bands: BandTable,
    /// Beat detector
    #[serde(default)]
    pub beat: BeatConfig,
    /// Coherence engine
    #[serde(default)]
    pub coherence: CoherenceConfig,
    /// Event generator
    #[serde(default)]
    pub events: EventConfig,
    /// Latency compensator
    #[serde(default)]
    pub latency: LatencyConfig,
    /// Parameter sink adapter
    #[serde(default)]
    pub sink: SinkConfig,
    /// Logging
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            spectrum: SpectrumConfig::default(),
            synthetic: SyntheticConfig::default(),
            bands: BandTable::primary(),
            fine_bands: BandTable::fine(),
            beat: BeatConfig::default(),
            coherence: CoherenceConfig::default(),
            events: EventConfig::default(),
            latency: LatencyConfig::default(),
            sink: SinkConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AnalysisSettings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings = toml::from_str(&text)?;
        info!("Settings loaded from {:?}", path.as_ref());
        Ok(settings)
    }

    /// Persist settings as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        info!("Settings saved to {:?}", path.as_ref());
        Ok(())
    }
}
