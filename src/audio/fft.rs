use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::Arc;

use super::{FrameSet, FrequencyFrame, TimeFrame};

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_SMOOTHING_TIME_CONSTANT: f32 = 0.85;
pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;

/// Turns the most recent window of mono samples into a [`FrameSet`].
///
/// Mirrors what a browser analyser node hands out: Blackman-windowed FFT,
/// per-bin temporal smoothing, and a decibel range mapped onto [0,1].
pub struct SpectrumTap {
    fft_size: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    smoothing_time_constant: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl SpectrumTap {
    /// `fft_size` is rounded up to the next power of two (minimum 32).
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(32).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft_size,
            fft,
            window: Self::blackman_window(fft_size),
            smoothed: vec![0.0; fft_size / 2],
            smoothing_time_constant: DEFAULT_SMOOTHING_TIME_CONSTANT,
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
        }
    }

    pub fn with_decibel_range(mut self, min_decibels: f32, max_decibels: f32) -> Self {
        if max_decibels > min_decibels {
            self.min_decibels = min_decibels;
            self.max_decibels = max_decibels;
        } else {
            log::warn!(
                "Ignoring decibel range [{}, {}]; keeping [{}, {}]",
                min_decibels, max_decibels, self.min_decibels, self.max_decibels
            );
        }
        self
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn set_smoothing_time_constant(&mut self, value: f32) {
        self.smoothing_time_constant = value.clamp(0.0, 0.99);
    }

    pub fn smoothing_time_constant(&self) -> f32 {
        self.smoothing_time_constant
    }

    fn blackman_window(size: usize) -> Vec<f32> {
        let n = size as f32;
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / n;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect()
    }

    /// Analyse the last `fft_size` samples of `recent`. Shorter input is
    /// zero-padded at the front.
    pub fn process(&mut self, recent: &[f32], sample_rate: f32) -> FrameSet {
        let time_domain = self.latest_window(recent);

        let mut buffer: Vec<Complex<f32>> = time_domain
            .iter()
            .zip(&self.window)
            .map(|(&x, &w)| Complex::new(x * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);

        let tau = self.smoothing_time_constant;
        let scale = 1.0 / self.fft_size as f32;
        for (smoothed, c) in self.smoothed.iter_mut().zip(&buffer[..self.fft_size / 2]) {
            let magnitude = c.norm() * scale;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
            if !smoothed.is_finite() {
                *smoothed = 0.0;
            }
        }

        let range = self.max_decibels - self.min_decibels;
        let magnitudes = self
            .smoothed
            .iter()
            .map(|&m| {
                if m <= 0.0 {
                    return 0.0;
                }
                let db = 20.0 * m.log10();
                ((db - self.min_decibels) / range).clamp(0.0, 1.0)
            })
            .collect();

        FrameSet {
            frequency: FrequencyFrame {
                magnitudes,
                sample_rate,
            },
            time: TimeFrame {
                samples: time_domain,
            },
        }
    }

    fn latest_window(&self, recent: &[f32]) -> Vec<f32> {
        let mut window = vec![0.0; self.fft_size];
        let take = recent.len().min(self.fft_size);
        window[self.fft_size - take..].copy_from_slice(&recent[recent.len() - take..]);
        window
    }
}
