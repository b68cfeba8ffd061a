//! Frequency band analysis
//!
//! Slices a frame's dB spectrum into named bands and computes per-band
//! energy, peak, and dominance. Pure: no state survives between frames.

use crate::audio::spectrum::db_to_linear;
use crate::audio::AudioFrame;
use serde::{Deserialize, Serialize};

/// Named frequency band identifiers.
///
/// The primary table uses the five coarse bands the event and coherence
/// layers consume; the fine table adds the narrow bands used for internal
/// analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BandId {
    /// 20-60 Hz (fine table only)
    SubBass,
    /// Low end; 0-250 Hz in the primary table
    Bass,
    /// 250-500 Hz
    LowMid,
    /// 500-2000 Hz primary, 500-1000 Hz fine
    Mid,
    /// 2000-4000 Hz primary, 1000-2000 Hz fine
    HighMid,
    /// 2000-4000 Hz (fine table only)
    UpperMid,
    /// 4000-6000 Hz (fine table only)
    Presence,
    /// High end; 4000-8000 Hz in the primary table
    Treble,
    /// 6000-12000 Hz (fine table only)
    Brilliance,
    /// 12000-20000 Hz (fine table only)
    Air,
}

/// A named contiguous frequency range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRange {
    /// Band identifier
    pub id: BandId,
    /// Lower edge in Hz (inclusive)
    pub min_hz: f32,
    /// Upper edge in Hz (exclusive)
    pub max_hz: f32,
}

impl BandRange {
    /// Construct a range.
    pub const fn new(id: BandId, min_hz: f32, max_hz: f32) -> Self {
        Self { id, min_hz, max_hz }
    }
}

/// Ordered set of band ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandTable {
    /// The ranges, in ascending frequency order
    pub bands: Vec<BandRange>,
}

impl BandTable {
    /// The five coarse semantic bands consumed by the event generator and
    /// coherence engine.
    pub fn primary() -> Self {
        Self {
            bands: vec![
                BandRange::new(BandId::Bass, 0.0, 250.0),
                BandRange::new(BandId::LowMid, 250.0, 500.0),
                BandRange::new(BandId::Mid, 500.0, 2000.0),
                BandRange::new(BandId::HighMid, 2000.0, 4000.0),
                BandRange::new(BandId::Treble, 4000.0, 8000.0),
            ],
        }
    }

    /// Nine narrow bands covering 20 Hz - 20 kHz for internal analysis.
    pub fn fine() -> Self {
        Self {
            bands: vec![
                BandRange::new(BandId::SubBass, 20.0, 60.0),
                BandRange::new(BandId::Bass, 60.0, 250.0),
                BandRange::new(BandId::LowMid, 250.0, 500.0),
                BandRange::new(BandId::Mid, 500.0, 1000.0),
                BandRange::new(BandId::HighMid, 1000.0, 2000.0),
                BandRange::new(BandId::UpperMid, 2000.0, 4000.0),
                BandRange::new(BandId::Presence, 4000.0, 6000.0),
                BandRange::new(BandId::Brilliance, 6000.0, 12000.0),
                BandRange::new(BandId::Air, 12000.0, 20000.0),
            ],
        }
    }

    /// Number of bands in the table.
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// True when the table has no bands.
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

impl Default for BandTable {
    fn default() -> Self {
        Self::primary()
    }
}

/// Computed measurements for one band in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandMeasure {
    /// Mean linear-scale magnitude across the band's bins (>= 0)
    pub energy: f32,
    /// Maximum raw dB value across the band's bins
    pub peak_db: f32,
    /// This band's share of the table's total energy, in [0, 1]
    pub dominance: f32,
}

/// Band measurements for one frame, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct BandMap {
    entries: Vec<(BandId, BandMeasure)>,
}

impl BandMap {
    /// Look up a band's measurements.
    pub fn get(&self, id: BandId) -> Option<&BandMeasure> {
        self.entries.iter().find(|(b, _)| *b == id).map(|(_, m)| m)
    }

    /// Energy of a band, 0.0 when the band is not in the table.
    pub fn energy(&self, id: BandId) -> f32 {
        self.get(id).map(|m| m.energy).unwrap_or(0.0)
    }

    /// Iterate over all bands in table order.
    pub fn iter(&self) -> impl Iterator<Item = &(BandId, BandMeasure)> {
        self.entries.iter()
    }

    /// Sum of all band energies.
    pub fn total_energy(&self) -> f32 {
        self.entries.iter().map(|(_, m)| m.energy).sum()
    }
}

/// Pure band analyzer over a fixed table.
#[derive(Debug, Clone)]
pub struct BandAnalyzer {
    table: BandTable,
    db_floor: f32,
}

impl BandAnalyzer {
    /// Create an analyzer for `table`. `db_floor` is the peak reported for
    /// bands whose range maps to no bins.
    pub fn new(table: BandTable, db_floor: f32) -> Self {
        Self { table, db_floor }
    }

    /// The analyzer's band table.
    pub fn table(&self) -> &BandTable {
        &self.table
    }

    /// Compute per-band energy, peak, and dominance for one frame.
    ///
    /// Guaranteed finite for every input frame, including all-silent ones:
    /// empty bin ranges report zero energy at the dB floor, and dominance is
    /// defined as 0 when total energy is 0.
    pub fn analyze(&self, frame: &AudioFrame) -> BandMap {
        let bin_hz = frame.bin_hz();
        let bin_count = frame.bin_count();

        let mut entries: Vec<(BandId, BandMeasure)> = Vec::with_capacity(self.table.len());

        for band in &self.table.bands {
            let min_bin = (band.min_hz / bin_hz).floor() as usize;
            let max_bin = ((band.max_hz / bin_hz).floor() as usize).min(bin_count.saturating_sub(1));

            let (energy, peak_db) = if min_bin >= bin_count || max_bin < min_bin {
                (0.0, self.db_floor)
            } else {
                let bins = &frame.frequency_db[min_bin..=max_bin];
                let sum: f32 = bins.iter().map(|&db| db_to_linear(db)).sum();
                let peak = bins.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                (sum / bins.len() as f32, peak)
            };

            entries.push((
                band.id,
                BandMeasure {
                    energy,
                    peak_db,
                    dominance: 0.0,
                },
            ));
        }

        let total: f32 = entries.iter().map(|(_, m)| m.energy).sum();
        if total > 0.0 {
            for (_, m) in entries.iter_mut() {
                m.dominance = m.energy / total;
            }
        }

        BandMap { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::spectrum::{SpectrumAnalyzer, SpectrumConfig};

    fn frame_from_sine(freq: f32) -> AudioFrame {
        let mut analyzer = SpectrumAnalyzer::new(SpectrumConfig {
            fft_size: 2048,
            smoothing: 0.0,
            ..Default::default()
        });
        let samples: Vec<f32> = (0..8192)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        analyzer.push_samples(&samples);
        analyzer.take_frame(0.0).unwrap()
    }

    fn silent_frame() -> AudioFrame {
        AudioFrame::new(0.0, 44100, vec![-100.0; 1024], vec![0.0; 2048], -100.0).unwrap()
    }

    #[test]
    fn test_bass_tone_lands_in_bass_band() {
        let analyzer = BandAnalyzer::new(BandTable::primary(), -100.0);
        let map = analyzer.analyze(&frame_from_sine(100.0));

        let bass = map.get(BandId::Bass).unwrap();
        for (id, m) in map.iter() {
            if *id != BandId::Bass {
                assert!(
                    bass.energy > m.energy,
                    "bass ({}) should dominate {:?} ({})",
                    bass.energy,
                    id,
                    m.energy
                );
            }
        }
        assert!(bass.dominance > 0.5, "dominance was {}", bass.dominance);
    }

    #[test]
    fn test_treble_tone_lands_in_treble_band() {
        let analyzer = BandAnalyzer::new(BandTable::primary(), -100.0);
        let map = analyzer.analyze(&frame_from_sine(6000.0));

        let treble = map.get(BandId::Treble).unwrap();
        let bass = map.get(BandId::Bass).unwrap();
        assert!(treble.energy > bass.energy * 2.0);
    }

    #[test]
    fn test_silence_is_finite_and_dominance_zero() {
        let analyzer = BandAnalyzer::new(BandTable::primary(), -100.0);
        let map = analyzer.analyze(&silent_frame());

        for (id, m) in map.iter() {
            assert!(m.energy.is_finite(), "{:?} energy not finite", id);
            assert!(m.peak_db.is_finite(), "{:?} peak not finite", id);
            assert!(m.dominance.is_finite(), "{:?} dominance not finite", id);
            assert_eq!(m.dominance, 0.0, "silent dominance must be 0");
            assert!(m.energy >= 0.0);
        }
    }

    #[test]
    fn test_dominance_sums_to_one() {
        let analyzer = BandAnalyzer::new(BandTable::fine(), -100.0);
        let map = analyzer.analyze(&frame_from_sine(440.0));

        let sum: f32 = map.iter().map(|(_, m)| m.dominance).sum();
        assert!((sum - 1.0).abs() < 1e-3, "dominance sum was {}", sum);
    }

    #[test]
    fn test_band_beyond_nyquist_is_empty() {
        // 8 kHz sample rate -> nyquist 4 kHz; the treble band (4-8 kHz) has
        // no bins at all
        let frame = AudioFrame::new(0.0, 8000, vec![-30.0; 512], vec![], -100.0).unwrap();
        let analyzer = BandAnalyzer::new(BandTable::primary(), -100.0);
        let map = analyzer.analyze(&frame);

        let treble = map.get(BandId::Treble).unwrap();
        assert_eq!(treble.energy, 0.0);
        assert_eq!(treble.peak_db, -100.0);
    }
}
