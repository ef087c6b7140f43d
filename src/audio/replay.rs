use anyhow::{anyhow, Context, Result};
use std::path::Path;

use super::{FrameSet, FrameSupplier, SpectrumTap};

/// Deterministic file-driven supplier: every `capture` advances the read
/// head by a fixed hop, independent of wall-clock time. Returns `None` once
/// the file is exhausted.
pub struct WavReplay {
    samples: Vec<f32>,
    sample_rate: u32,
    hop: usize,
    cursor: usize,
    tap: SpectrumTap,
}

impl WavReplay {
    /// `frame_rate` sets the hop: one tick covers `sample_rate / frame_rate`
    /// samples.
    pub fn open<P: AsRef<Path>>(path: P, tap: SpectrumTap, frame_rate: f32) -> Result<Self> {
        let (samples, sample_rate) = read_wav_mono(path.as_ref())?;
        log::info!(
            "Replaying {} ({} Hz, {} samples)",
            path.as_ref().display(),
            sample_rate,
            samples.len()
        );
        Ok(Self::from_samples(samples, sample_rate, tap, frame_rate))
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, tap: SpectrumTap, frame_rate: f32) -> Self {
        let frame_rate = if frame_rate.is_finite() && frame_rate > 0.0 { frame_rate } else { 60.0 };
        let hop = ((sample_rate as f32 / frame_rate).round() as usize).max(1);
        Self {
            samples,
            sample_rate,
            hop,
            cursor: 0,
            tap,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Ticks needed to consume the whole file.
    pub fn tick_count(&self) -> usize {
        self.samples.len().div_ceil(self.hop)
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.samples.len()
    }

    /// Playback position of the read head in milliseconds.
    pub fn position_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.cursor as f64 * 1000.0 / self.sample_rate as f64
    }
}

impl FrameSupplier for WavReplay {
    fn capture(&mut self) -> Option<FrameSet> {
        if self.is_finished() {
            return None;
        }
        self.cursor = (self.cursor + self.hop).min(self.samples.len());
        let start = self.cursor.saturating_sub(self.tap.fft_size());
        Some(self.tap.process(&self.samples[start..self.cursor], self.sample_rate as f32))
    }

    fn set_smoothing_time_constant(&mut self, value: f32) {
        self.tap.set_smoothing_time_constant(value);
    }

    fn name(&self) -> &'static str {
        "wav-replay"
    }
}

/// Decode a PCM or float WAV and mix all channels down to mono in [-1,1].
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| anyhow!(err)))
            .collect::<Result<Vec<f32>>>()?,
        hound::SampleFormat::Int => {
            if !(8..=32).contains(&spec.bits_per_sample) {
                return Err(anyhow!(
                    "Unsupported bits per sample {} in {}",
                    spec.bits_per_sample,
                    path.display()
                ));
            }
            let max = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / max).map_err(|err| anyhow!(err)))
                .collect::<Result<Vec<f32>>>()?
        }
    };

    let mono = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok((mono, spec.sample_rate))
}
