//! Mock audio input for tests and headless environments
//!
//! Behaves like a live source but is fed by the test itself.

use super::spectrum::{SpectrumAnalyzer, SpectrumConfig};
use super::{AudioFrame, AudioSource, InputMode, VolumeMeasure};
use std::collections::VecDeque;

/// Test double for a live input: queue chunks, poll frames.
pub struct MockSource {
    analyzer: SpectrumAnalyzer,
    pending: VecDeque<Vec<f32>>,
    sample_rate: u32,
}

impl MockSource {
    /// Create a mock source with the given front-end configuration.
    pub fn new(spectrum: SpectrumConfig) -> Self {
        let sample_rate = spectrum.sample_rate;
        Self {
            analyzer: SpectrumAnalyzer::new(spectrum),
            pending: VecDeque::new(),
            sample_rate,
        }
    }

    /// Queue a chunk of samples for the next poll.
    pub fn push_chunk(&mut self, chunk: Vec<f32>) {
        self.pending.push_back(chunk);
    }
}

impl AudioSource for MockSource {
    fn poll_frame(&mut self, now_ms: f64) -> Option<AudioFrame> {
        while let Some(chunk) = self.pending.pop_front() {
            self.analyzer.push_samples(&chunk);
        }
        self.analyzer.take_frame(now_ms)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn input_mode(&self) -> InputMode {
        InputMode::Live
    }

    fn volume(&self) -> VolumeMeasure {
        self.analyzer.volume()
    }
}
