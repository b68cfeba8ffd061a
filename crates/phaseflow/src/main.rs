//! PhaseFlow - Audio-Reactive 4D Visualizer Core
//!
//! Headless driver for the analysis pipeline: acquires audio (live device,
//! WAV file, or the synthetic fallback), runs the per-tick analysis, and
//! forwards the derived parameter stream plus spawn events to the attached
//! coordinators. The actual 4D rasterizer consumes the same parameter sink
//! contract from its own process.

#![warn(missing_docs)]

mod logging_setup;

use anyhow::{Context, Result};
use phaseflow_control::{
    HapticConfig, HapticEngine, NullVibration, ParticleConfig, ParticleField, TelegraphConfig,
    TelegraphScheduler,
};
use phaseflow_core::{
    audio, check_settings, AnalysisPipeline, AnalysisSettings, AudioSource, CalibrationProbe,
    Clock, CoreError, IssueSeverity, LatencyCompensator, ParameterSink, SystemClock,
    TickScheduler, WavSource,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Parameter sink that logs forwarded updates. The external rasterizer
/// attaches through the same trait.
struct LogSink {
    updates_forwarded: u64,
}

impl ParameterSink for LogSink {
    fn update(&mut self, name: &'static str, value: f64) {
        self.updates_forwarded += 1;
        debug!("param {name} = {value:.4}");
    }
}

/// The app has no loopback wiring of its own; the compensator falls back to
/// platform defaults and adapts from interaction timing instead.
struct NoLoopback;

impl CalibrationProbe for NoLoopback {
    fn measure_round_trip_ms(&mut self, _: f32, _: f32) -> phaseflow_core::Result<f64> {
        Err(CoreError::CalibrationFailed(
            "no loopback path in headless mode".into(),
        ))
    }
}

struct Args {
    wav: Option<PathBuf>,
    settings: Option<PathBuf>,
    duration_s: f64,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        wav: None,
        settings: None,
        duration_s: 30.0,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--wav" => {
                args.wav = Some(PathBuf::from(
                    iter.next().context("--wav requires a path")?,
                ));
            }
            "--settings" => {
                args.settings = Some(PathBuf::from(
                    iter.next().context("--settings requires a path")?,
                ));
            }
            "--duration" => {
                args.duration_s = iter
                    .next()
                    .context("--duration requires seconds")?
                    .parse()
                    .context("--duration must be a number")?;
            }
            other => anyhow::bail!("Unknown argument: {other} (expected --wav/--settings/--duration)"),
        }
    }
    Ok(args)
}

fn open_source(args: &Args, settings: &AnalysisSettings) -> Box<dyn AudioSource> {
    if let Some(path) = &args.wav {
        match WavSource::open(path, settings.spectrum.clone()) {
            Ok(source) => return Box::new(source),
            Err(e) => warn!("Could not open {path:?} ({e}); falling back"),
        }
    }
    audio::acquire_or_fallback(settings)
}

fn main() -> Result<()> {
    let args = parse_args()?;

    let settings = match &args.settings {
        Some(path) => AnalysisSettings::load(path)
            .with_context(|| format!("Failed to load settings from {path:?}"))?,
        None => AnalysisSettings::default(),
    };

    let _log_guard = logging_setup::init(&settings.log)?;

    // Refuse to start on a broken configuration; surface warnings and go on
    let issues = check_settings(&settings);
    let mut fatal = false;
    for issue in &issues {
        match issue.severity {
            IssueSeverity::Error => {
                error!("Config error: {}", issue.message);
                fatal = true;
            }
            IssueSeverity::Warning => warn!("Config warning: {}", issue.message),
            IssueSeverity::Info => info!("Config note: {}", issue.message),
        }
    }
    if fatal {
        anyhow::bail!("Settings failed validation; see log for details");
    }

    let mut source = open_source(&args, &settings);
    info!(
        "Input: {:?} at {} Hz",
        source.input_mode(),
        source.sample_rate()
    );

    // Calibrate before the tick loop starts; failure is recoverable
    let mut compensator = LatencyCompensator::new(settings.latency.clone());
    compensator.calibrate(&mut NoLoopback);
    info!(
        "Latency profile: {:.0} ms total (confidence {:.2})",
        compensator.profile().total_ms,
        compensator.confidence()
    );

    let mut pipeline = AnalysisPipeline::new(&settings);
    let mut scheduler = TickScheduler::new(settings.latency.adapt_interval_ms);
    let mut sink = LogSink {
        updates_forwarded: 0,
    };

    let mut telegraphs = TelegraphScheduler::new(TelegraphConfig {
        min_telegraph_ms: settings.events.min_telegraph_ms,
        ..Default::default()
    });
    let mut particles = ParticleField::new(ParticleConfig::default());
    let haptics = HapticEngine::new(HapticConfig::default());
    let mut vibration = NullVibration;

    let clock = SystemClock::new();
    let tick = Duration::from_micros(16_667); // ~60 Hz
    let mut last_tick_ms = clock.now_ms();

    info!("Tick loop starting ({:.0} s run)", args.duration_s);

    while clock.now_ms() < args.duration_s * 1000.0 {
        let now_ms = clock.now_ms();

        // Acquisition -> analysis -> coherence -> events -> sink, serial
        if let Some(frame) = source.poll_frame(now_ms) {
            let out = pipeline.process_frame(&frame, &mut sink);

            let strength = if out.beat.beat_detected {
                out.beat.strength.max(0.1)
            } else {
                0.0
            };
            particles.update(&out.coherence, strength, 0, now_ms - last_tick_ms);
            if out.beat.beat_detected {
                haptics.on_beat(&out.coherence, out.beat.strength, &mut vibration);
                if let Some((id, m)) = out
                    .fine_bands
                    .iter()
                    .max_by(|a, b| a.1.dominance.total_cmp(&b.1.dominance))
                {
                    debug!(
                        "beat: strength {:.2}, bpm {:.1}, dominant band {:?} ({:.0}%)",
                        out.beat.strength,
                        out.beat.bpm,
                        id,
                        m.dominance * 100.0
                    );
                }
            }

            if let Err(e) = telegraphs.ingest(&out.due_events) {
                warn!("Dropping event batch: {e}");
            }
            for event in &out.due_events {
                haptics.on_event(event, &mut vibration);
            }
        }

        // Headless: unanswered telegraphs expire, feeding the difficulty loop
        for miss in telegraphs.update(now_ms) {
            pipeline.record_outcome(miss.outcome);
            compensator.record_timing_measurement(miss.expected_ms, miss.actual_ms);
        }

        scheduler.pump(now_ms);
        if scheduler.poll_adaptation(now_ms) {
            compensator.adapt(now_ms);
        }

        last_tick_ms = now_ms;
        std::thread::sleep(tick);
    }

    let stats = pipeline.stats();
    info!(
        "Done: {} frames, {} beats, {} events, {} parameter updates, difficulty {:.2}, offset {:.1} ms",
        stats.frames_processed,
        stats.beats_detected,
        stats.events_emitted,
        sink.updates_forwarded,
        pipeline.difficulty(),
        compensator.profile().adaptive_offset_ms
    );

    Ok(())
}
