pub mod analysis_api;
pub mod beat_detector;
pub mod capture;
pub mod extractor;
pub mod fft;
pub mod live_source;
pub mod playback;
pub mod remote_source;
pub mod replay;
pub mod router;
pub mod shaper;
pub mod synthesizer;

pub use analysis_api::{AnalysisApi, HttpAnalysisApi};
pub use beat_detector::BeatDetector;
pub use capture::MicrophoneCapture;
pub use extractor::FeatureExtractor;
pub use fft::SpectrumTap;
pub use live_source::{FrameSupplier, LiveSource, TickTiming};
pub use playback::MediaFileTap;
pub use remote_source::{PlaybackClock, RemoteSource};
pub use replay::WavReplay;
pub use router::{FeatureSource, SourceRouter};
pub use shaper::{SignalShaper, TuningState, TuningUpdate};
pub use synthesizer::{AnalysisTier, LoadError, LoadOutcome, RemoteFeatureSynthesizer, TierKind};

use serde::{Deserialize, Serialize};

/// One captured magnitude spectrum. Magnitudes are in [0,1], one per bin,
/// covering 0 Hz up to the Nyquist frequency.
#[derive(Debug, Clone)]
pub struct FrequencyFrame {
    pub magnitudes: Vec<f32>,
    pub sample_rate: f32,
}

impl FrequencyFrame {
    pub fn nyquist(&self) -> f32 {
        self.sample_rate / 2.0
    }

    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }
}

/// Raw time-domain samples centred at zero.
#[derive(Debug, Clone, Default)]
pub struct TimeFrame {
    pub samples: Vec<f32>,
}

/// Everything one analysis tick captures from a live source.
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub frequency: FrequencyFrame,
    pub time: TimeFrame,
}

/// Perceptual frequency bands. `Vocal` overlaps its neighbours on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Sub,
    Bass,
    LowMid,
    Mid,
    HighMid,
    Treble,
    Vocal,
}

impl Band {
    pub const ALL: [Band; 7] = [
        Band::Sub,
        Band::Bass,
        Band::LowMid,
        Band::Mid,
        Band::HighMid,
        Band::Treble,
        Band::Vocal,
    ];

    /// Hz range `[low, high]` covered by the band.
    pub fn range_hz(self) -> (f32, f32) {
        match self {
            Band::Sub => (20.0, 60.0),
            Band::Bass => (60.0, 160.0),
            Band::LowMid => (160.0, 400.0),
            Band::Mid => (400.0, 2000.0),
            Band::HighMid => (2000.0, 6000.0),
            Band::Treble => (6000.0, 11025.0),
            Band::Vocal => (1000.0, 4000.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Band::Sub => "sub",
            Band::Bass => "bass",
            Band::LowMid => "lowMid",
            Band::Mid => "mid",
            Band::HighMid => "highMid",
            Band::Treble => "treble",
            Band::Vocal => "vocal",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandSet {
    pub sub: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub treble: f32,
    pub vocal: f32,
}

impl BandSet {
    pub fn get(&self, band: Band) -> f32 {
        match band {
            Band::Sub => self.sub,
            Band::Bass => self.bass,
            Band::LowMid => self.low_mid,
            Band::Mid => self.mid,
            Band::HighMid => self.high_mid,
            Band::Treble => self.treble,
            Band::Vocal => self.vocal,
        }
    }

    pub fn set(&mut self, band: Band, value: f32) {
        match band {
            Band::Sub => self.sub = value,
            Band::Bass => self.bass = value,
            Band::LowMid => self.low_mid = value,
            Band::Mid => self.mid = value,
            Band::HighMid => self.high_mid = value,
            Band::Treble => self.treble = value,
            Band::Vocal => self.vocal = value,
        }
    }
}

/// Derived per-frame metrics, all in [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub energy: f32,
    pub centroid: f32,
    pub spectral_flux: f32,
    pub zero_crossing_rate: f32,
    pub beat_pulse: f32,
}

/// The unit handed to renderers once per frame. The default value is the
/// all-zero quiescent snapshot used whenever no data exists yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub bands: BandSet,
    pub metrics: Metrics,
}

/// Every scalar the shaper keeps smoothing state for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Band(Band),
    Energy,
    Centroid,
    Flux,
    Zcr,
    Beat,
}

impl Signal {
    pub const COUNT: usize = 12;

    pub fn index(self) -> usize {
        match self {
            Signal::Band(band) => band as usize,
            Signal::Energy => 7,
            Signal::Centroid => 8,
            Signal::Flux => 9,
            Signal::Zcr => 10,
            Signal::Beat => 11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_indices_are_distinct() {
        let mut seen = [false; Signal::COUNT];
        let signals = Band::ALL
            .iter()
            .map(|&b| Signal::Band(b))
            .chain([Signal::Energy, Signal::Centroid, Signal::Flux, Signal::Zcr, Signal::Beat]);
        for signal in signals {
            assert!(!seen[signal.index()], "duplicate index for {:?}", signal);
            seen[signal.index()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_band_ranges_are_non_negative_intervals() {
        for band in Band::ALL {
            let (low, high) = band.range_hz();
            assert!(low >= 0.0 && high > low, "{} has a bad range", band.name());
        }
    }

    #[test]
    fn test_default_snapshot_is_all_zero() {
        let snapshot = FeatureSnapshot::default();
        for band in Band::ALL {
            assert_eq!(snapshot.bands.get(band), 0.0);
        }
        assert_eq!(snapshot.metrics, Metrics::default());
    }
}
