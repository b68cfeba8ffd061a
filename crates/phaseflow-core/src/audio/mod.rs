//! Signal acquisition
//!
//! Wraps a live device stream, a WAV file, or the synthetic generator behind
//! one [`AudioSource`] interface. Every source produces [`AudioFrame`]
//! snapshots through the shared FFT front-end in [`spectrum`], so the
//! analysis layers never care where the samples came from.

pub mod spectrum;
pub mod synthetic;
pub mod wav;

#[cfg(feature = "audio")]
pub mod backend;
#[cfg(feature = "mock-audio")]
pub mod mock;

use crate::config::AnalysisSettings;
use crate::CoreError;
use thiserror::Error;
use tracing::warn;

/// Errors raised while opening or running an audio input.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// No capture device, or the device refused our configuration
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The input stream could not be built or started
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// WAV file could not be opened or decoded
    #[error("Audio file error: {0}")]
    File(#[from] hound::Error),

    /// The input carries a sample format we do not handle
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// Where the current signal comes from. Surfaced to the UI layer so the
/// synthetic fallback is never silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InputMode {
    /// Live capture device
    Live,
    /// WAV file playback
    File,
    /// Synthetic generator (acquisition-failure fallback)
    Synthetic,
}

/// RMS and peak loudness of the most recent analysis window.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeMeasure {
    /// Smoothed RMS volume (0.0 - 1.0)
    pub rms: f32,
    /// Peak volume with fast attack and slow decay (0.0 - 1.0)
    pub peak: f32,
}

/// Immutable per-tick snapshot of the signal in both domains.
///
/// Produced once per analysis tick by the acquisition layer and consumed
/// read-only by every analyzer. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Capture timestamp in clock milliseconds
    pub timestamp_ms: f64,
    /// Sample rate of the originating stream, carried for bin math
    pub sample_rate: u32,
    /// dB-scale magnitude spectrum (fft_size / 2 bins)
    pub frequency_db: Vec<f32>,
    /// Time-domain samples of the analysis window
    pub time_samples: Vec<f32>,
}

impl AudioFrame {
    /// Build a frame, validating shape and sanitizing non-finite values.
    ///
    /// Non-finite magnitudes are replaced with `db_floor`, non-finite time
    /// samples with 0.0, so degeneracy can never enter the analysis path.
    pub fn new(
        timestamp_ms: f64,
        sample_rate: u32,
        mut frequency_db: Vec<f32>,
        mut time_samples: Vec<f32>,
        db_floor: f32,
    ) -> crate::Result<Self> {
        if !timestamp_ms.is_finite() {
            return Err(CoreError::InvalidFrame("non-finite timestamp".into()));
        }
        if sample_rate == 0 {
            return Err(CoreError::InvalidFrame("zero sample rate".into()));
        }
        if frequency_db.is_empty() {
            return Err(CoreError::InvalidFrame("empty magnitude spectrum".into()));
        }
        for m in frequency_db.iter_mut() {
            if !m.is_finite() {
                *m = db_floor;
            }
        }
        for s in time_samples.iter_mut() {
            if !s.is_finite() {
                *s = 0.0;
            }
        }
        Ok(Self {
            timestamp_ms,
            sample_rate,
            frequency_db,
            time_samples,
        })
    }

    /// Number of frequency bins.
    pub fn bin_count(&self) -> usize {
        self.frequency_db.len()
    }

    /// Nyquist frequency of the originating stream.
    pub fn nyquist_hz(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    /// Width of one frequency bin in Hz.
    pub fn bin_hz(&self) -> f32 {
        self.nyquist_hz() / self.frequency_db.len() as f32
    }

    /// Center frequency of bin `i`.
    pub fn bin_frequency(&self, i: usize) -> f32 {
        i as f32 * self.bin_hz()
    }
}

/// A frame-producing audio input.
///
/// `poll_frame` is called once per tick with the scheduler's current time;
/// it returns `None` while the source has not accumulated enough samples for
/// a new analysis window (or, for files, after the stream ended).
pub trait AudioSource: Send {
    /// Pull the next analysis frame, if one is ready.
    fn poll_frame(&mut self, now_ms: f64) -> Option<AudioFrame>;

    /// Sample rate of the underlying stream.
    fn sample_rate(&self) -> u32;

    /// Which kind of input this is.
    fn input_mode(&self) -> InputMode;

    /// Loudness of the most recent window.
    fn volume(&self) -> VolumeMeasure;
}

/// Open the best available source: live capture when the `audio` feature is
/// enabled and a device cooperates, otherwise the synthetic generator.
///
/// Acquisition failure is never fatal; the tick loop must always start in
/// some valid mode. The fallback is logged and surfaced through
/// [`AudioSource::input_mode`].
pub fn acquire_or_fallback(settings: &AnalysisSettings) -> Box<dyn AudioSource> {
    #[cfg(feature = "audio")]
    {
        match backend::LiveSource::open(settings.spectrum.clone()) {
            Ok(live) => return Box::new(live),
            Err(e) => {
                warn!("Live audio unavailable, falling back to synthetic input: {e}");
            }
        }
    }
    #[cfg(not(feature = "audio"))]
    {
        warn!("Built without the `audio` feature; using synthetic input");
    }
    Box::new(synthetic::SyntheticSource::new(
        settings.spectrum.clone(),
        settings.synthetic.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_validation() {
        assert!(AudioFrame::new(0.0, 44100, vec![], vec![], -100.0).is_err());
        assert!(AudioFrame::new(f64::NAN, 44100, vec![-30.0], vec![], -100.0).is_err());
        assert!(AudioFrame::new(0.0, 0, vec![-30.0], vec![], -100.0).is_err());
    }

    #[test]
    fn test_frame_sanitizes_non_finite() {
        let frame = AudioFrame::new(
            10.0,
            48000,
            vec![f32::NAN, -20.0, f32::INFINITY],
            vec![f32::NEG_INFINITY, 0.5],
            -100.0,
        )
        .unwrap();

        assert_eq!(frame.frequency_db[0], -100.0);
        assert_eq!(frame.frequency_db[1], -20.0);
        assert_eq!(frame.frequency_db[2], -100.0);
        assert_eq!(frame.time_samples[0], 0.0);
        assert_eq!(frame.time_samples[1], 0.5);
    }

    #[test]
    fn test_frame_bin_math() {
        let frame = AudioFrame::new(0.0, 44100, vec![-100.0; 1024], vec![], -100.0).unwrap();
        assert_eq!(frame.nyquist_hz(), 22050.0);
        assert!((frame.bin_hz() - 22050.0 / 1024.0).abs() < 1e-3);
        assert_eq!(frame.bin_frequency(0), 0.0);
    }
}
