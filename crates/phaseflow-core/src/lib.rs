//! PhaseFlow Core - Audio Analysis and Coherence Engine
//!
//! This crate contains the analysis core that turns an audio stream into the
//! shared parameter state driving the visual and haptic layers:
//! - Signal acquisition (live, file, or synthetic) and the FFT front-end
//! - Frequency band analysis
//! - Beat and tempo tracking
//! - Latency calibration and adaptive compensation
//! - The unified coherence engine (single source of truth for all renderers)
//! - Procedural spawn-event generation
//! - The parameter sink adapter

#![warn(missing_docs)]

use thiserror::Error;

pub mod audio;
pub mod bands;
pub mod beat;
pub mod clock;
pub mod coherence;
pub mod config;
pub mod diagnostics;
pub mod events;
pub mod latency;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod sink;

// --- Re-exports grouped by category ---

// Acquisition
pub use audio::{
    spectrum::{SpectrumAnalyzer, SpectrumConfig},
    synthetic::{SyntheticConfig, SyntheticSource},
    wav::WavSource,
    AcquisitionError, AudioFrame, AudioSource, InputMode, VolumeMeasure,
};

// Analysis
pub use bands::{BandAnalyzer, BandId, BandMap, BandMeasure, BandRange, BandTable};
pub use beat::{BeatConfig, BeatObservation, BeatSnapshot, BeatTracker};
pub use coherence::{
    CoherenceConfig, CoherenceEngine, CoherenceState, EnergyState, PhaseState, Rotation4D,
    SpectralState, TempoState,
};

// Events & Output
pub use events::{
    BandAction, EventConfig, EventGenerator, EventKind, EventOutcome, GeometryKind,
    InteractionKind, SpawnEvent,
};
pub use sink::{MemorySink, ParameterMapper, ParameterSink, SinkConfig};

// Timing
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use latency::{
    CalibrationPhase, CalibrationProbe, LatencyCompensator, LatencyConfig, LatencyProfile,
};
pub use scheduler::{TickScheduler, TimerHandle};

// Configuration & Diagnostics
pub use config::AnalysisSettings;
pub use diagnostics::{check_settings, ConfigIssue, IssueSeverity};
pub use logging::LogConfig;
pub use pipeline::{AnalysisPipeline, PipelineStats, TickOutput};

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// An audio frame failed construction-time validation
    #[error("Invalid audio frame: {0}")]
    InvalidFrame(String),

    /// A configuration value is out of its allowed range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Loopback latency calibration did not produce a usable measurement
    #[error("Calibration failed: {0}")]
    CalibrationFailed(String),

    /// Settings file I/O failed
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed
    #[error("Settings parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Settings could not be serialized
    #[error("Settings serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
