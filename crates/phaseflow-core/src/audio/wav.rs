//! WAV file input
//!
//! File-based playback source: decodes the whole file up front (mixed down
//! to mono f32) and feeds it through the shared FFT front-end at the rate
//! the clock advances.

use super::spectrum::{SpectrumAnalyzer, SpectrumConfig};
use super::{AcquisitionError, AudioFrame, AudioSource, InputMode, VolumeMeasure};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use tracing::info;

/// WAV-backed [`AudioSource`].
pub struct WavSource {
    analyzer: SpectrumAnalyzer,
    samples: Vec<f32>,
    sample_rate: u32,
    cursor: usize,
    last_poll_ms: Option<f64>,
    looping: bool,
}

impl WavSource {
    /// Open a WAV file, mixing all channels down to mono.
    pub fn open(
        path: impl AsRef<Path>,
        mut spectrum: SpectrumConfig,
    ) -> Result<Self, AcquisitionError> {
        let reader = WavReader::open(path.as_ref())?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let samples: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        info!(
            "WAV loaded: {} samples at {} Hz ({} channels mixed to mono)",
            samples.len(),
            spec.sample_rate,
            channels
        );

        // The front-end must agree with the file's rate for bin math to hold
        spectrum.sample_rate = spec.sample_rate;

        Ok(Self {
            analyzer: SpectrumAnalyzer::new(spectrum),
            samples,
            sample_rate: spec.sample_rate,
            cursor: 0,
            last_poll_ms: None,
            looping: false,
        })
    }

    /// Restart playback from the beginning when the file runs out.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// True once the file is fully consumed (never true when looping).
    pub fn finished(&self) -> bool {
        !self.looping && self.cursor >= self.samples.len()
    }
}

impl AudioSource for WavSource {
    fn poll_frame(&mut self, now_ms: f64) -> Option<AudioFrame> {
        let elapsed_ms = match self.last_poll_ms {
            Some(last) => (now_ms - last).max(0.0),
            None => 50.0,
        };
        self.last_poll_ms = Some(now_ms);

        let mut count = (elapsed_ms / 1000.0 * self.sample_rate as f64).round() as usize;
        count = count.min(self.sample_rate as usize);

        while count > 0 {
            if self.cursor >= self.samples.len() {
                if self.looping {
                    self.cursor = 0;
                } else {
                    break;
                }
            }
            let take = count.min(self.samples.len() - self.cursor);
            let chunk = &self.samples[self.cursor..self.cursor + take];
            self.analyzer.push_samples(chunk);
            self.cursor += take;
            count -= take;
        }

        self.analyzer.take_frame(now_ms)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn input_mode(&self) -> InputMode {
        InputMode::File
    }

    fn volume(&self) -> VolumeMeasure {
        self.analyzer.volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_test_wav(path: &std::path::Path, seconds: f32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        let count = (44100.0 * seconds) as usize;
        for i in 0..count {
            let s = (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 44100.0).sin() * 0.5;
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_wav_playback_produces_frames() {
        let dir = std::env::temp_dir();
        let path = dir.join("phaseflow_wav_source_test.wav");
        write_test_wav(&path, 0.5);

        let mut source = WavSource::open(
            &path,
            SpectrumConfig {
                fft_size: 1024,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(source.input_mode(), InputMode::File);
        assert_eq!(source.sample_rate(), 44100);

        let mut frames = 0;
        for tick in 0..40 {
            if source.poll_frame(tick as f64 * 16.0).is_some() {
                frames += 1;
            }
        }
        assert!(frames > 0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_wav_finishes() {
        let dir = std::env::temp_dir();
        let path = dir.join("phaseflow_wav_finish_test.wav");
        write_test_wav(&path, 0.1);

        let mut source = WavSource::open(&path, SpectrumConfig::default()).unwrap();
        // Drain well past the 100 ms of content
        for tick in 0..60 {
            source.poll_frame(tick as f64 * 16.0);
        }
        assert!(source.finished());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = WavSource::open("/nonexistent/phaseflow.wav", SpectrumConfig::default());
        assert!(result.is_err());
    }
}
