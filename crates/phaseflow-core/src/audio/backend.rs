//! Live capture backend (cpal)
//!
//! The device stream lives on a dedicated worker thread (cpal streams are
//! not `Send`); sample chunks cross to the analysis side over a bounded
//! channel. When the analysis side falls behind, chunks are dropped and
//! counted rather than letting the queue grow.

use super::spectrum::{SpectrumAnalyzer, SpectrumConfig};
use super::{AcquisitionError, AudioFrame, AudioSource, InputMode, VolumeMeasure};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Channel capacity in chunks; at typical callback sizes this is well under
/// a second of audio.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Handle to the capture worker thread.
pub struct CpalBackend {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    receiver: Receiver<Vec<f32>>,
    dropped: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalBackend {
    /// Start capturing from the default input device.
    pub fn start() -> Result<Self, AcquisitionError> {
        let (chunk_tx, chunk_rx) = bounded::<Vec<f32>>(CHUNK_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = bounded::<Result<u32, AcquisitionError>>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        let worker_shutdown = Arc::clone(&shutdown);
        let worker_dropped = Arc::clone(&dropped);

        let join = std::thread::Builder::new()
            .name("phaseflow-capture".into())
            .spawn(move || {
                capture_worker(chunk_tx, ready_tx, worker_shutdown, worker_dropped);
            })
            .map_err(|e| AcquisitionError::Stream(e.to_string()))?;

        let sample_rate = ready_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| {
                AcquisitionError::DeviceUnavailable("capture thread never reported ready".into())
            })??;

        info!("Live capture started at {} Hz", sample_rate);

        Ok(Self {
            shutdown,
            join: Some(join),
            receiver: chunk_rx,
            dropped,
            sample_rate,
        })
    }

    /// Sample rate negotiated with the device.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples discarded because the analysis side fell behind.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drain all pending chunks into `analyzer`.
    pub fn drain_into(&self, analyzer: &mut SpectrumAnalyzer) {
        while let Ok(chunk) = self.receiver.try_recv() {
            analyzer.push_samples(&chunk);
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn capture_worker(
    chunk_tx: Sender<Vec<f32>>,
    ready_tx: Sender<Result<u32, AcquisitionError>>,
    shutdown: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
) {
    let stream = match build_stream(chunk_tx, &dropped) {
        Ok((stream, sample_rate)) => {
            let _ = ready_tx.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        error!("Failed to start capture stream: {e}");
        return;
    }

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(50));
    }
    debug!("Capture worker shutting down");
}

fn build_stream(
    chunk_tx: Sender<Vec<f32>>,
    dropped: &Arc<AtomicU64>,
) -> Result<(cpal::Stream, u32), AcquisitionError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| AcquisitionError::DeviceUnavailable("no default input device".into()))?;

    let supported = device
        .default_input_config()
        .map_err(|e| AcquisitionError::DeviceUnavailable(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();

    debug!(
        "Input device: {:?}, {} Hz, {} ch, {:?}",
        device.name().unwrap_or_else(|_| "<unnamed>".into()),
        sample_rate,
        channels,
        sample_format
    );

    let err_fn = |err| error!("Capture stream error: {err}");
    let config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let dropped = Arc::clone(dropped);
            device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        forward_chunk(&chunk_tx, mixdown(data, channels), &dropped);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| AcquisitionError::Stream(e.to_string()))?
        }
        cpal::SampleFormat::I16 => {
            let dropped = Arc::clone(dropped);
            device
                .build_input_stream(
                    &config,
                    move |data: &[i16], _| {
                        let floats: Vec<f32> =
                            data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                        forward_chunk(&chunk_tx, mixdown(&floats, channels), &dropped);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| AcquisitionError::Stream(e.to_string()))?
        }
        other => {
            return Err(AcquisitionError::UnsupportedFormat(format!("{other:?}")));
        }
    };

    Ok((stream, sample_rate))
}

fn mixdown(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn forward_chunk(tx: &Sender<Vec<f32>>, chunk: Vec<f32>, dropped: &AtomicU64) {
    let len = chunk.len() as u64;
    match tx.try_send(chunk) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            let total = dropped.fetch_add(len, Ordering::Relaxed) + len;
            if total % 44100 < len {
                warn!("Analysis side falling behind; {} samples dropped so far", total);
            }
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Live [`AudioSource`] backed by [`CpalBackend`].
pub struct LiveSource {
    backend: CpalBackend,
    analyzer: SpectrumAnalyzer,
}

impl LiveSource {
    /// Start live capture; the front-end is reconfigured to the device rate.
    pub fn open(mut spectrum: SpectrumConfig) -> Result<Self, AcquisitionError> {
        let backend = CpalBackend::start()?;
        spectrum.sample_rate = backend.sample_rate();
        Ok(Self {
            analyzer: SpectrumAnalyzer::new(spectrum),
            backend,
        })
    }

    /// Samples dropped due to backpressure.
    pub fn dropped_samples(&self) -> u64 {
        self.backend.dropped_samples()
    }
}

impl AudioSource for LiveSource {
    fn poll_frame(&mut self, now_ms: f64) -> Option<AudioFrame> {
        self.backend.drain_into(&mut self.analyzer);
        self.analyzer.take_frame(now_ms)
    }

    fn sample_rate(&self) -> u32 {
        self.backend.sample_rate()
    }

    fn input_mode(&self) -> InputMode {
        InputMode::Live
    }

    fn volume(&self) -> VolumeMeasure {
        self.analyzer.volume()
    }
}
