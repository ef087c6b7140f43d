use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::audio::analysis_api::AnalysisApiConfig;
use crate::audio::fft::{
    DEFAULT_FFT_SIZE, DEFAULT_MAX_DECIBELS, DEFAULT_MIN_DECIBELS, DEFAULT_SMOOTHING_TIME_CONSTANT,
};
use crate::audio::{SpectrumTap, TuningState};

/// Analyser settings for local sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing_time_constant: DEFAULT_SMOOTHING_TIME_CONSTANT,
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
        }
    }
}

impl CaptureConfig {
    pub fn spectrum_tap(&self) -> SpectrumTap {
        let mut tap = SpectrumTap::new(self.fft_size)
            .with_decibel_range(self.min_decibels, self.max_decibels);
        tap.set_smoothing_time_constant(self.smoothing_time_constant);
        tap
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub tuning: TuningState,
    pub analysis: AnalysisApiConfig,
    pub capture: CaptureConfig,
    /// Render cadence in frames per second.
    pub frame_rate: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tuning: TuningState::default(),
            analysis: AnalysisApiConfig::default(),
            capture: CaptureConfig::default(),
            frame_rate: 60.0,
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Like [`EngineConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        log::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Seconds between render frames.
    pub fn frame_interval_secs(&self) -> f32 {
        if self.frame_rate.is_finite() && self.frame_rate > 0.0 {
            1.0 / self.frame_rate
        } else {
            1.0 / 60.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("luma-config-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{"tuning": {"gamma": 1.2}, "frameRate": 30}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tuning.gamma, 1.2);
        assert_eq!(config.tuning.sensitivity, TuningState::default().sensitivity);
        assert_eq!(config.frame_rate, 30.0);
        assert_eq!(config.capture, CaptureConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("roundtrip");
        let mut config = EngineConfig::default();
        config.capture.fft_size = 1024;
        config.analysis.base_url = "http://localhost:9000/v1".to_string();
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let path = temp_path("missing");
        assert!(EngineConfig::load(&path).is_err());
        assert_eq!(EngineConfig::load_or_default(&path).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_bad_frame_rate_falls_back() {
        let config = EngineConfig {
            frame_rate: 0.0,
            ..EngineConfig::default()
        };
        assert!((config.frame_interval_secs() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_capture_config_builds_tap() {
        let capture = CaptureConfig {
            fft_size: 512,
            smoothing_time_constant: 0.3,
            ..CaptureConfig::default()
        };
        let tap = capture.spectrum_tap();
        assert_eq!(tap.fft_size(), 512);
        assert_eq!(tap.smoothing_time_constant(), 0.3);
    }
}
