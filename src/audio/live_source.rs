use std::time::{Duration, Instant};

use super::shaper::MAX_SMOOTHING;
use super::{BeatDetector, FeatureExtractor, FeatureSnapshot, FeatureSource, FrameSet, TuningState};

/// Anything that can hand out the current frequency/time frames once per tick.
pub trait FrameSupplier {
    /// Frames for this tick, or `None` while nothing has been captured yet.
    fn capture(&mut self) -> Option<FrameSet>;

    /// Forwarded from the user's smoothing tuning; suppliers without a
    /// temporal smoothing stage ignore it.
    fn set_smoothing_time_constant(&mut self, _value: f32) {}

    fn name(&self) -> &'static str;
}

/// How the beat detector learns the time between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickTiming {
    /// Real elapsed time between calls.
    WallClock,
    /// A fixed step per call, for offline replay where output must be
    /// reproducible.
    Fixed(Duration),
}

/// Extractor + beat detector driven by a local frame supplier.
pub struct LiveSource<S: FrameSupplier> {
    supplier: S,
    extractor: FeatureExtractor,
    detector: BeatDetector,
    timing: TickTiming,
    last_tick: Instant,
}

impl<S: FrameSupplier> LiveSource<S> {
    pub fn new(supplier: S, timing: TickTiming) -> Self {
        log::info!("Live source ready: {} ({:?})", supplier.name(), timing);
        Self {
            supplier,
            extractor: FeatureExtractor::new(),
            detector: BeatDetector::new(),
            timing,
            last_tick: Instant::now(),
        }
    }

    pub fn supplier(&self) -> &S {
        &self.supplier
    }

    fn tick_seconds(&mut self) -> f32 {
        match self.timing {
            TickTiming::Fixed(step) => step.as_secs_f32(),
            TickTiming::WallClock => {
                let now = Instant::now();
                let dt = now.duration_since(self.last_tick).as_secs_f32();
                self.last_tick = now;
                dt
            }
        }
    }
}

impl<S: FrameSupplier> FeatureSource for LiveSource<S> {
    fn raw_features(&mut self) -> FeatureSnapshot {
        let frames = match self.supplier.capture() {
            Some(frames) => frames,
            None => return FeatureSnapshot::default(),
        };

        let mut snapshot = self.extractor.extract(&frames);
        let dt = self.tick_seconds();
        let (beat, pulse) = self.detector.update(snapshot.metrics.energy, dt);
        if beat {
            log::debug!("Beat detected (energy {:.3})", snapshot.metrics.energy);
        }
        snapshot.metrics.beat_pulse = pulse;
        snapshot
    }

    fn apply_tuning(&mut self, tuning: &TuningState) {
        self.supplier
            .set_smoothing_time_constant(tuning.smoothing.clamp(0.0, MAX_SMOOTHING));
    }

    fn name(&self) -> &'static str {
        self.supplier.name()
    }
}
