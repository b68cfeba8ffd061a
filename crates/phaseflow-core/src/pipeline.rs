//! Per-tick analysis pipeline
//!
//! Strictly serial orchestration of one tick: band analysis, beat tracking,
//! coherence update, event generation, parameter mapping. The pipeline is a
//! pure function of the frames fed into it; all time comes from frame
//! timestamps, so an identical frame sequence replayed through a fresh
//! pipeline yields numerically identical coherence states.

use crate::audio::AudioFrame;
use crate::bands::{BandAnalyzer, BandMap};
use crate::beat::{BeatObservation, BeatTracker};
use crate::coherence::{CoherenceEngine, CoherenceState};
use crate::config::AnalysisSettings;
use crate::events::{EventGenerator, EventOutcome, SpawnEvent};
use crate::sink::{ParameterMapper, ParameterSink};
use tracing::debug;

/// Counters describing pipeline throughput.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    /// Frames pushed through the pipeline
    pub frames_processed: u64,
    /// Beats accepted by the tracker
    pub beats_detected: u64,
    /// Spawn events emitted
    pub events_emitted: u64,
}

/// Everything one tick produced, for consumers that want more than the sink
/// updates.
#[derive(Debug, Clone)]
pub struct TickOutput {
    /// Timestamp of the processed frame
    pub timestamp_ms: f64,
    /// Coarse band measurements (the event/coherence view)
    pub bands: BandMap,
    /// Fine band measurements for internal analysis and diagnostics
    pub fine_bands: BandMap,
    /// Beat observation
    pub beat: BeatObservation,
    /// The shared state after this tick
    pub coherence: CoherenceState,
    /// Events that became due this tick, in spawn-time order
    pub due_events: Vec<SpawnEvent>,
}

/// Serial per-tick orchestrator.
pub struct AnalysisPipeline {
    band_analyzer: BandAnalyzer,
    fine_analyzer: BandAnalyzer,
    beat_tracker: BeatTracker,
    coherence: CoherenceEngine,
    events: EventGenerator,
    mapper: ParameterMapper,
    stats: PipelineStats,
}

impl AnalysisPipeline {
    /// Build a pipeline from settings.
    pub fn new(settings: &AnalysisSettings) -> Self {
        Self {
            band_analyzer: BandAnalyzer::new(settings.bands.clone(), settings.spectrum.db_floor),
            fine_analyzer: BandAnalyzer::new(
                settings.fine_bands.clone(),
                settings.spectrum.db_floor,
            ),
            beat_tracker: BeatTracker::new(settings.beat.clone()),
            coherence: CoherenceEngine::new(settings.coherence.clone()),
            events: EventGenerator::new(settings.events.clone()),
            mapper: ParameterMapper::new(settings.sink.clone()),
            stats: PipelineStats::default(),
        }
    }

    /// Process one frame: acquisition is upstream, rendering downstream;
    /// everything between runs here, in dependency order, with no
    /// suspension mid-tick.
    pub fn process_frame(
        &mut self,
        frame: &AudioFrame,
        sink: &mut dyn ParameterSink,
    ) -> TickOutput {
        let now_ms = frame.timestamp_ms;

        let bands = self.band_analyzer.analyze(frame);
        let fine_bands = self.fine_analyzer.analyze(frame);
        let beat = self.beat_tracker.observe(&bands, now_ms);
        let snapshot = self.beat_tracker.snapshot();
        let coherence = self.coherence.update(frame, &bands, &snapshot, now_ms).clone();

        let emitted = self.events.observe(&bands, &coherence, &beat, now_ms);
        let due_events = self.events.drain_due(now_ms);

        self.mapper.apply(&coherence, &due_events, sink);

        self.stats.frames_processed += 1;
        if beat.beat_detected {
            self.stats.beats_detected += 1;
        }
        self.stats.events_emitted += emitted as u64;

        if self.stats.frames_processed % 600 == 0 {
            debug!(
                "Pipeline: {} frames, {} beats, {} events, bpm {:.1}",
                self.stats.frames_processed,
                self.stats.beats_detected,
                self.stats.events_emitted,
                beat.bpm
            );
        }

        TickOutput {
            timestamp_ms: now_ms,
            bands,
            fine_bands,
            beat,
            coherence,
            due_events,
        }
    }

    /// Report a resolved event back into the difficulty loop.
    pub fn record_outcome(&mut self, outcome: EventOutcome) {
        self.events.record_outcome(outcome);
    }

    /// Current difficulty multiplier.
    pub fn difficulty(&self) -> f32 {
        self.events.difficulty()
    }

    /// The shared coherence state after the most recent tick.
    pub fn coherence(&self) -> &CoherenceState {
        self.coherence.state()
    }

    /// Throughput counters.
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}
