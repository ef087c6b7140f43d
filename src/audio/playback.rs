use anyhow::Result;
use log::info;
use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};

use super::{FrameSet, FrameSupplier, SpectrumTap};

/// A fully decoded file: interleaved for the output device, mono for analysis.
pub struct DecodedAudio {
    pub interleaved: Vec<f32>,
    pub mono: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn decode<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = BufReader::new(File::open(&path)?);
        let source = Decoder::new(file)?;

        let sample_rate = source.sample_rate();
        let channels = source.channels().max(1);
        let interleaved: Vec<f32> = source
            .convert_samples::<i16>()
            .map(|s| s as f32 / 32768.0)
            .collect();

        Ok(Self::from_interleaved(interleaved, channels, sample_rate))
    }

    pub fn from_interleaved(interleaved: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let mono = interleaved
            .chunks_exact(channels as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect();
        Self {
            interleaved,
            mono,
            channels,
            sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.mono.len() as f64 / self.sample_rate as f64)
    }

    /// Up to `len` mono samples ending at `position`.
    pub fn window_ending_at(&self, position: Duration, len: usize) -> &[f32] {
        let end = ((position.as_secs_f64() * self.sample_rate as f64) as usize).min(self.mono.len());
        &self.mono[end.saturating_sub(len)..end]
    }
}

/// Playback position bookkeeping, independent of the output device.
#[derive(Debug, Clone, Default)]
pub(crate) struct PlayheadClock {
    accumulated: Duration,
    resumed_at: Option<Instant>,
}

impl PlayheadClock {
    pub(crate) fn resume(&mut self, now: Instant) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(now);
        }
    }

    pub(crate) fn pause(&mut self, now: Instant) {
        if let Some(started) = self.resumed_at.take() {
            self.accumulated += now.saturating_duration_since(started);
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.resumed_at.is_some()
    }

    pub(crate) fn position(&self, now: Instant) -> Duration {
        match self.resumed_at {
            Some(started) => self.accumulated + now.saturating_duration_since(started),
            None => self.accumulated,
        }
    }
}

/// Plays a local media file and taps what is currently audible.
///
/// While paused or stopped the tap is fed silence, so the spectrum decays
/// the way an analyser on a silent element does.
pub struct MediaFileTap {
    #[allow(dead_code)]
    stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Option<Sink>,
    audio: DecodedAudio,
    clock: PlayheadClock,
    tap: SpectrumTap,
    volume: f32,
}

impl MediaFileTap {
    pub fn open<P: AsRef<Path>>(path: P, tap: SpectrumTap) -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()?;
        let audio = DecodedAudio::decode(&path)?;
        info!(
            "Loaded audio file: {:?} ({}Hz, {} channels, {:.1}s)",
            path.as_ref(),
            audio.sample_rate,
            audio.channels,
            audio.duration().as_secs_f32()
        );

        Ok(Self {
            stream,
            stream_handle,
            sink: None,
            audio,
            clock: PlayheadClock::default(),
            tap,
            volume: 1.0,
        })
    }

    pub fn play(&mut self) -> Result<()> {
        if self.sink.is_none() {
            let sink = Sink::try_new(&self.stream_handle)?;
            sink.set_volume(self.volume);
            sink.append(SamplesBuffer::new(
                self.audio.channels,
                self.audio.sample_rate,
                self.audio.interleaved.clone(),
            ));
            self.sink = Some(sink);
        }
        if let Some(sink) = &self.sink {
            sink.play();
        }
        self.clock.resume(Instant::now());
        info!("Audio playback started");
        Ok(())
    }

    pub fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
            self.clock.pause(Instant::now());
            info!("Audio playback paused");
        }
    }

    /// Stops and rewinds; the next `play` starts from the beginning.
    pub fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
            info!("Audio playback stopped");
        }
        self.clock.reset();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
    }

    pub fn duration(&self) -> Duration {
        self.audio.duration()
    }
}

/// Frames for what is audible at `now`: the window ending at the playhead
/// while it runs, silence otherwise.
fn audible_frames(audio: &DecodedAudio, clock: &PlayheadClock, tap: &mut SpectrumTap, now: Instant) -> FrameSet {
    let sample_rate = audio.sample_rate as f32;
    let position = clock.position(now);
    if !clock.is_running() || position >= audio.duration() {
        return tap.process(&[], sample_rate);
    }
    let window = audio.window_ending_at(position, tap.fft_size());
    tap.process(window, sample_rate)
}

impl FrameSupplier for MediaFileTap {
    fn capture(&mut self) -> Option<FrameSet> {
        Some(audible_frames(&self.audio, &self.clock, &mut self.tap, Instant::now()))
    }

    fn set_smoothing_time_constant(&mut self, value: f32) {
        self.tap.set_smoothing_time_constant(value);
    }

    fn name(&self) -> &'static str {
        "media-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_mixdown() {
        let audio = DecodedAudio::from_interleaved(vec![1.0, 0.0, 0.2, 0.4], 2, 8000);
        assert_eq!(audio.mono.len(), 2);
        assert!((audio.mono[0] - 0.5).abs() < 1e-6);
        assert!((audio.mono[1] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_window_ending_at_position() {
        let samples: Vec<f32> = (0..8000).map(|i| i as f32).collect();
        let audio = DecodedAudio::from_interleaved(samples, 1, 8000);

        let window = audio.window_ending_at(Duration::from_millis(500), 4);
        assert_eq!(window, &[3996.0, 3997.0, 3998.0, 3999.0]);

        // Near the start the window is shorter
        assert_eq!(audio.window_ending_at(Duration::from_micros(250), 16).len(), 2);

        // Past the end clamps to the last samples
        let tail = audio.window_ending_at(Duration::from_secs(5), 2);
        assert_eq!(tail, &[7998.0, 7999.0]);
    }

    #[test]
    fn test_playhead_pause_and_resume() {
        let start = Instant::now();
        let mut clock = PlayheadClock::default();
        assert_eq!(clock.position(start), Duration::ZERO);

        clock.resume(start);
        clock.pause(start + Duration::from_millis(300));
        assert!(!clock.is_running());
        assert_eq!(clock.position(start + Duration::from_secs(10)), Duration::from_millis(300));

        clock.resume(start + Duration::from_secs(1));
        assert_eq!(
            clock.position(start + Duration::from_millis(1200)),
            Duration::from_millis(500)
        );

        clock.reset();
        assert_eq!(clock.position(start + Duration::from_secs(2)), Duration::ZERO);
    }

    fn spectrum_sum(frames: &FrameSet) -> f32 {
        frames.frequency.magnitudes.iter().sum::<f32>()
    }

    #[test]
    fn test_paused_and_stopped_tap_hears_silence() {
        let sample_rate = 8000;
        let samples: Vec<f32> = (0..sample_rate * 2)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect();
        let audio = DecodedAudio::from_interleaved(samples, 1, sample_rate);
        let mut tap = SpectrumTap::new(256);
        tap.set_smoothing_time_constant(0.0);

        let start = Instant::now();
        let mut clock = PlayheadClock::default();
        clock.resume(start);
        let playing = audible_frames(&audio, &clock, &mut tap, start + Duration::from_millis(500));
        assert!(spectrum_sum(&playing) > 0.0);
        assert!(playing.time.samples.iter().any(|&s| s != 0.0));

        clock.pause(start + Duration::from_millis(500));
        let paused = audible_frames(&audio, &clock, &mut tap, start + Duration::from_millis(600));
        assert_eq!(spectrum_sum(&paused), 0.0);
        assert!(paused.time.samples.iter().all(|&s| s == 0.0));

        clock.resume(start + Duration::from_millis(700));
        clock.reset();
        let stopped = audible_frames(&audio, &clock, &mut tap, start + Duration::from_millis(800));
        assert_eq!(spectrum_sum(&stopped), 0.0);

        // Past the end of the file is silent too
        clock.resume(start);
        let finished = audible_frames(&audio, &clock, &mut tap, start + Duration::from_secs(3));
        assert_eq!(spectrum_sum(&finished), 0.0);
    }
}
