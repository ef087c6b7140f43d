use super::{Band, BandSet, FeatureSnapshot, FrameSet, FrequencyFrame, Metrics, TimeFrame};

/// Divisor factor for spectral flux: the raw flux sum is divided by
/// `bin_count * FLUX_NORMALIZATION`. Chosen by eye for visual response.
pub const FLUX_NORMALIZATION: f32 = 0.1;

/// Per-tick spectral and temporal feature extraction.
///
/// Everything except spectral flux is a pure function of the current frame.
/// Flux needs the previous tick's magnitudes, which the extractor owns and
/// overwrites on every call.
pub struct FeatureExtractor {
    previous_magnitudes: Vec<f32>,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self {
            previous_magnitudes: Vec::new(),
        }
    }

    /// Extract bands and metrics for one tick. `beat_pulse` is left at zero;
    /// the beat detector fills it in.
    pub fn extract(&mut self, frames: &FrameSet) -> FeatureSnapshot {
        let spectrum = &frames.frequency;

        let mut bands = BandSet::default();
        for band in Band::ALL {
            let (low, high) = band.range_hz();
            bands.set(band, Self::band_energy(spectrum, low, high));
        }

        let metrics = Metrics {
            energy: Self::energy(spectrum),
            centroid: Self::spectral_centroid(spectrum),
            spectral_flux: self.spectral_flux(spectrum),
            zero_crossing_rate: Self::zero_crossing_rate(&frames.time),
            beat_pulse: 0.0,
        };

        FeatureSnapshot { bands, metrics }
    }

    fn freq_to_index(spectrum: &FrequencyFrame, hz: f32) -> usize {
        let bins = spectrum.bin_count();
        let nyquist = spectrum.nyquist();
        if bins == 0 || nyquist <= 0.0 {
            return 0;
        }
        let index = (hz / nyquist * bins as f32).round();
        (index.max(0.0) as usize).min(bins - 1)
    }

    /// Mean magnitude over the bins covering `[low_hz, high_hz)`.
    pub fn band_energy(spectrum: &FrequencyFrame, low_hz: f32, high_hz: f32) -> f32 {
        let start = Self::freq_to_index(spectrum, low_hz);
        let end = Self::freq_to_index(spectrum, high_hz);
        Self::average_range(&spectrum.magnitudes, start, end)
    }

    fn average_range(data: &[f32], start: usize, end: usize) -> f32 {
        if start >= end || start >= data.len() {
            return 0.0;
        }

        let end = end.min(data.len());
        let sum: f32 = data[start..end].iter().sum();
        sum / (end - start) as f32
    }

    pub fn energy(spectrum: &FrequencyFrame) -> f32 {
        if spectrum.magnitudes.is_empty() {
            return 0.0;
        }
        let sum: f32 = spectrum.magnitudes.iter().sum();
        (sum / spectrum.bin_count() as f32).clamp(0.0, 1.0)
    }

    /// Frequency-weighted centre of mass, as a fraction of Nyquist.
    pub fn spectral_centroid(spectrum: &FrequencyFrame) -> f32 {
        let total: f32 = spectrum.magnitudes.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }

        let nyquist = spectrum.nyquist();
        let bins = spectrum.bin_count() as f32;
        let weighted_sum: f32 = spectrum
            .magnitudes
            .iter()
            .enumerate()
            .map(|(i, &magnitude)| (i as f32 / bins) * nyquist * magnitude)
            .sum();

        (weighted_sum / total / nyquist).clamp(0.0, 1.0)
    }

    fn spectral_flux(&mut self, spectrum: &FrequencyFrame) -> f32 {
        let bins = spectrum.bin_count();
        if bins == 0 {
            self.previous_magnitudes.clear();
            return 0.0;
        }
        if self.previous_magnitudes.len() != bins {
            self.previous_magnitudes = vec![0.0; bins];
        }

        let mut flux = 0.0;
        for (previous, &current) in self.previous_magnitudes.iter_mut().zip(&spectrum.magnitudes) {
            let diff = current - *previous;
            if diff > 0.0 {
                flux += diff;
            }
            *previous = current;
        }

        (flux / (bins as f32 * FLUX_NORMALIZATION)).min(1.0)
    }

    pub fn zero_crossing_rate(time: &TimeFrame) -> f32 {
        let samples = &time.samples;
        if samples.is_empty() {
            return 0.0;
        }

        let crossings = samples
            .windows(2)
            .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
            .count();

        (crossings as f32 / samples.len() as f32).clamp(0.0, 1.0)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(magnitudes: Vec<f32>, samples: Vec<f32>) -> FrameSet {
        FrameSet {
            frequency: FrequencyFrame {
                magnitudes,
                sample_rate: 44100.0,
            },
            time: TimeFrame { samples },
        }
    }

    #[test]
    fn test_silence_yields_zero_metrics() {
        let mut extractor = FeatureExtractor::new();
        let snapshot = extractor.extract(&frame(vec![0.0; 1024], vec![0.0; 2048]));

        assert_eq!(snapshot.metrics.energy, 0.0);
        assert_eq!(snapshot.metrics.centroid, 0.0);
        assert_eq!(snapshot.metrics.spectral_flux, 0.0);
        assert_eq!(snapshot.metrics.zero_crossing_rate, 0.0);
        for band in Band::ALL {
            assert_eq!(snapshot.bands.get(band), 0.0);
        }
    }

    #[test]
    fn test_band_index_mapping() {
        // 1024 bins over 22050 Hz: 60 Hz -> bin 3, 160 Hz -> bin 7
        let mut magnitudes = vec![0.0; 1024];
        for m in &mut magnitudes[3..7] {
            *m = 1.0;
        }
        let spectrum = FrequencyFrame {
            magnitudes,
            sample_rate: 44100.0,
        };
        let bass = FeatureExtractor::band_energy(&spectrum, 60.0, 160.0);
        assert!((bass - 1.0).abs() < 1e-6);
        assert_eq!(FeatureExtractor::band_energy(&spectrum, 400.0, 2000.0), 0.0);
    }

    #[test]
    fn test_zero_width_band_is_zero() {
        let spectrum = FrequencyFrame {
            magnitudes: vec![1.0; 1024],
            sample_rate: 44100.0,
        };
        assert_eq!(FeatureExtractor::band_energy(&spectrum, 500.0, 500.0), 0.0);
        // Both bounds beyond Nyquist clamp to the last bin
        assert_eq!(FeatureExtractor::band_energy(&spectrum, 30000.0, 40000.0), 0.0);
    }

    #[test]
    fn test_centroid_of_single_bin() {
        let mut magnitudes = vec![0.0; 1024];
        magnitudes[512] = 0.8;
        let spectrum = FrequencyFrame {
            magnitudes,
            sample_rate: 44100.0,
        };
        let centroid = FeatureExtractor::spectral_centroid(&spectrum);
        assert!((centroid - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_flux_tracks_positive_changes_only() {
        let mut extractor = FeatureExtractor::new();
        let first = extractor.extract(&frame(vec![0.0; 100], vec![]));
        assert_eq!(first.metrics.spectral_flux, 0.0);

        // +0.05 on every bin: 100 * 0.05 / (100 * 0.1) = 0.5
        let rising = extractor.extract(&frame(vec![0.05; 100], vec![]));
        assert!((rising.metrics.spectral_flux - 0.5).abs() < 1e-5);

        let falling = extractor.extract(&frame(vec![0.0; 100], vec![]));
        assert_eq!(falling.metrics.spectral_flux, 0.0);

        let saturated = extractor.extract(&frame(vec![1.0; 100], vec![]));
        assert_eq!(saturated.metrics.spectral_flux, 1.0);
    }

    #[test]
    fn test_flux_resets_when_bin_count_changes() {
        let mut extractor = FeatureExtractor::new();
        extractor.extract(&frame(vec![1.0; 64], vec![]));
        let snapshot = extractor.extract(&frame(vec![0.0; 128], vec![]));
        assert_eq!(snapshot.metrics.spectral_flux, 0.0);
    }

    #[test]
    fn test_zero_crossing_rate_alternating() {
        let samples: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let zcr = FeatureExtractor::zero_crossing_rate(&TimeFrame { samples });
        assert!((zcr - 0.99).abs() < 1e-6);
        assert_eq!(FeatureExtractor::zero_crossing_rate(&TimeFrame::default()), 0.0);
    }
}
