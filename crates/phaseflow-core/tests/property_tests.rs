//! Invariant properties checked over generated inputs.

use phaseflow_core::{
    AnalysisPipeline, AnalysisSettings, AudioFrame, BandAnalyzer, BandTable, BeatConfig,
    BeatTracker, MemorySink,
};
use proptest::prelude::*;

/// Arbitrary dB spectra, including silent and pathological ones.
fn spectrum_strategy() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-100.0f32..0.0, 64..=1024)
}

proptest! {
    /// Band analysis never produces NaN/Infinity, for any spectrum shape.
    #[test]
    fn band_measures_always_finite(spectrum in spectrum_strategy(), sample_rate in 8000u32..96000) {
        let frame = AudioFrame::new(0.0, sample_rate, spectrum, vec![], -100.0).unwrap();
        let analyzer = BandAnalyzer::new(BandTable::primary(), -100.0);
        let map = analyzer.analyze(&frame);

        for (id, m) in map.iter() {
            prop_assert!(m.energy.is_finite(), "{:?} energy not finite", id);
            prop_assert!(m.energy >= 0.0, "{:?} energy negative", id);
            prop_assert!(m.peak_db.is_finite(), "{:?} peak not finite", id);
            prop_assert!(m.dominance.is_finite(), "{:?} dominance not finite", id);
            prop_assert!((0.0..=1.0).contains(&m.dominance), "{:?} dominance out of range", id);
        }
    }

    /// No beat is ever accepted within the refractory window, for any
    /// energy sequence.
    #[test]
    fn refractory_holds_for_any_energy_sequence(
        levels in prop::collection::vec(-100.0f32..0.0, 50..300),
    ) {
        let analyzer = BandAnalyzer::new(BandTable::primary(), -100.0);
        let mut tracker = BeatTracker::new(BeatConfig::default());

        let mut last_beat: Option<f64> = None;
        for (i, level) in levels.iter().enumerate() {
            let t = i as f64 * 16.0;
            let frame = AudioFrame::new(t, 44100, vec![*level; 512], vec![], -100.0).unwrap();
            let obs = tracker.observe(&analyzer.analyze(&frame), t);
            if obs.beat_detected {
                if let Some(last) = last_beat {
                    prop_assert!(
                        t - last >= 300.0,
                        "beat at {} only {} ms after previous",
                        t,
                        t - last
                    );
                }
                last_beat = Some(t);
            }
        }
    }

    /// BPM stays inside its clamp range no matter what the input does.
    #[test]
    fn bpm_always_clamped(
        levels in prop::collection::vec(-100.0f32..0.0, 50..300),
    ) {
        let analyzer = BandAnalyzer::new(BandTable::primary(), -100.0);
        let mut tracker = BeatTracker::new(BeatConfig::default());

        for (i, level) in levels.iter().enumerate() {
            let t = i as f64 * 16.0;
            let frame = AudioFrame::new(t, 44100, vec![*level; 512], vec![], -100.0).unwrap();
            let obs = tracker.observe(&analyzer.analyze(&frame), t);
            prop_assert!((60.0..=200.0).contains(&obs.bpm), "BPM {} escaped clamp", obs.bpm);
            prop_assert!((0.0..=1.0).contains(&obs.rhythm_complexity));
            prop_assert!((0.0..=1.0).contains(&obs.confidence));
        }
    }

    /// Every emitted event keeps the telegraph fairness floor, across
    /// arbitrary spectra and outcome histories.
    #[test]
    fn telegraph_floor_universal(
        spectra in prop::collection::vec(spectrum_strategy(), 10..40),
        hits in prop::collection::vec(any::<bool>(), 0..30),
    ) {
        use phaseflow_core::EventOutcome;

        let settings = AnalysisSettings::default();
        let mut pipeline = AnalysisPipeline::new(&settings);
        let mut sink = MemorySink::new();

        for hit in hits {
            pipeline.record_outcome(if hit { EventOutcome::Hit } else { EventOutcome::Miss });
        }

        for (i, spectrum) in spectra.into_iter().enumerate() {
            let t = i as f64 * 16.0;
            let frame = AudioFrame::new(t, 44100, spectrum, vec![], -100.0).unwrap();
            let out = pipeline.process_frame(&frame, &mut sink);
            for event in &out.due_events {
                prop_assert!(
                    event.telegraph_ms >= 3000.0,
                    "telegraph {} below floor at difficulty {}",
                    event.telegraph_ms,
                    event.difficulty
                );
                prop_assert!(event.quadrant <= 4);
            }
        }
    }
}
