use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use log::{info, warn};
use std::collections::VecDeque;

use super::{FrameSet, FrameSupplier, SpectrumTap};

/// Live input from the default capture device.
///
/// The cpal callback mixes each buffer to mono and sends it over a channel;
/// `capture` drains the channel into a window of the most recent samples and
/// runs the spectrum tap over it.
pub struct MicrophoneCapture {
    #[allow(dead_code)]
    stream: Stream,
    receiver: Receiver<Vec<f32>>,
    recent: VecDeque<f32>,
    tap: SpectrumTap,
    sample_rate: f32,
    device_name: String,
}

impl MicrophoneCapture {
    pub fn new(tap: SpectrumTap) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No input device available"))?;

        let config = device
            .default_input_config()
            .map_err(|e| anyhow::anyhow!("Failed to get default input config: {}", e))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", device_name);
        info!("Audio config: {:?}", config);

        let sample_rate = config.sample_rate().0 as f32;
        let (sender, receiver) = crossbeam_channel::unbounded();

        let stream = Self::create_input_stream(&device, &config.into(), sender)?;
        stream.play()?;

        Ok(Self {
            stream,
            receiver,
            recent: VecDeque::with_capacity(tap.fft_size()),
            tap,
            sample_rate,
            device_name,
        })
    }

    fn create_input_stream(
        device: &Device,
        config: &StreamConfig,
        sender: Sender<Vec<f32>>,
    ) -> Result<Stream> {
        let channels = config.channels as usize;
        info!(
            "Creating input stream with {} channels at {} Hz",
            channels, config.sample_rate.0
        );

        let stream = device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if sender.send(mix_to_mono(data, channels)).is_err() {
                    warn!("Capture channel closed");
                }
            },
            |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;

        Ok(stream)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn drain(&mut self) -> usize {
        let mut received = 0;
        let capacity = self.tap.fft_size();
        while let Ok(chunk) = self.receiver.try_recv() {
            received += chunk.len();
            push_recent(&mut self.recent, &chunk, capacity);
        }
        received
    }
}

impl FrameSupplier for MicrophoneCapture {
    fn capture(&mut self) -> Option<FrameSet> {
        self.drain();
        if self.recent.is_empty() {
            return None;
        }
        let window = self.recent.make_contiguous();
        Some(self.tap.process(window, self.sample_rate))
    }

    fn set_smoothing_time_constant(&mut self, value: f32) {
        self.tap.set_smoothing_time_constant(value);
    }

    fn name(&self) -> &'static str {
        "microphone"
    }
}

pub(crate) fn mix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Append `chunk`, keeping only the newest `capacity` samples.
pub(crate) fn push_recent(recent: &mut VecDeque<f32>, chunk: &[f32], capacity: usize) {
    let skip = chunk.len().saturating_sub(capacity);
    recent.extend(&chunk[skip..]);
    while recent.len() > capacity {
        recent.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_to_mono() {
        assert_eq!(mix_to_mono(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(mix_to_mono(&[0.25, -0.25], 1), vec![0.25, -0.25]);
        // Trailing partial frame is dropped
        assert_eq!(mix_to_mono(&[1.0, 1.0, 1.0], 2), vec![1.0]);
    }

    #[test]
    fn test_recent_window_keeps_newest() {
        let mut recent = VecDeque::new();
        push_recent(&mut recent, &[1.0, 2.0, 3.0], 4);
        push_recent(&mut recent, &[4.0, 5.0], 4);
        assert_eq!(recent.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0, 5.0]);

        push_recent(&mut recent, &[6.0, 7.0, 8.0, 9.0, 10.0, 11.0], 4);
        assert_eq!(recent.iter().copied().collect::<Vec<_>>(), vec![8.0, 9.0, 10.0, 11.0]);
    }
}
