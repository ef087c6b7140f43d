use super::{FeatureSnapshot, SignalShaper, TuningState, TuningUpdate};

/// Common interface for everything that can produce unshaped features:
/// live extraction or remote synthesis. Renderers never see which one is
/// active, they only read the router's shaped output.
pub trait FeatureSource {
    /// Unshaped features for this frame. Must not block.
    fn raw_features(&mut self) -> FeatureSnapshot;

    /// Changes whenever the material behind the source changes (a new track
    /// was committed). The router resets its smoothing history on change.
    fn generation(&self) -> u64 {
        0
    }

    /// Called after every tuning change.
    fn apply_tuning(&mut self, _tuning: &TuningState) {}

    /// Used for logging.
    fn name(&self) -> &'static str;
}

/// Holds whichever source is active and shapes its output.
pub struct SourceRouter {
    source: Option<Box<dyn FeatureSource>>,
    shaper: SignalShaper,
    seen_generation: u64,
}

impl SourceRouter {
    pub fn new(tuning: TuningState) -> Self {
        Self {
            source: None,
            shaper: SignalShaper::new(tuning),
            seen_generation: 0,
        }
    }

    /// Swap the active source. Smoothing history from the previous source is
    /// dropped so unrelated material never bleeds into the new one.
    pub fn bind(&mut self, mut source: Box<dyn FeatureSource>) {
        log::info!("Binding feature source: {}", source.name());
        source.apply_tuning(self.shaper.tuning());
        self.seen_generation = source.generation();
        self.shaper.reset();
        self.source = Some(source);
    }

    pub fn unbind(&mut self) -> Option<Box<dyn FeatureSource>> {
        self.shaper.reset();
        let previous = self.source.take();
        if let Some(source) = &previous {
            log::info!("Unbound feature source: {}", source.name());
        }
        previous
    }

    pub fn active_source(&self) -> Option<&'static str> {
        self.source.as_ref().map(|s| s.name())
    }

    /// Shaped features for the current frame, or the all-zero snapshot when
    /// no source is bound.
    pub fn current_features(&mut self) -> FeatureSnapshot {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return FeatureSnapshot::default(),
        };

        let generation = source.generation();
        if generation != self.seen_generation {
            log::debug!(
                "Source {} moved to generation {}, resetting smoothing",
                source.name(),
                generation
            );
            self.seen_generation = generation;
            self.shaper.reset();
        }

        let raw = source.raw_features();
        self.shaper.shape_snapshot(&raw)
    }

    pub fn set_tuning(&mut self, update: &TuningUpdate) {
        self.shaper.set_tuning(update);
        if let Some(source) = self.source.as_mut() {
            source.apply_tuning(self.shaper.tuning());
        }
    }

    pub fn tuning(&self) -> &TuningState {
        self.shaper.tuning()
    }
}

impl Default for SourceRouter {
    fn default() -> Self {
        Self::new(TuningState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::live_source::tests::ScriptedSupplier;
    use crate::audio::{Band, LiveSource, TickTiming};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct ConstantSource {
        value: f32,
        generation: Arc<AtomicU64>,
    }

    impl FeatureSource for ConstantSource {
        fn raw_features(&mut self) -> FeatureSnapshot {
            let mut snapshot = FeatureSnapshot::default();
            snapshot.bands.bass = self.value;
            snapshot.metrics.energy = self.value;
            snapshot
        }

        fn generation(&self) -> u64 {
            self.generation.load(Ordering::SeqCst)
        }

        fn name(&self) -> &'static str {
            "constant"
        }
    }

    fn constant(value: f32) -> (Box<ConstantSource>, Arc<AtomicU64>) {
        let generation = Arc::new(AtomicU64::new(0));
        let source = ConstantSource {
            value,
            generation: Arc::clone(&generation),
        };
        (Box::new(source), generation)
    }

    #[test]
    fn test_unbound_router_is_quiescent() {
        let mut router = SourceRouter::default();
        assert_eq!(router.active_source(), None);
        assert_eq!(router.current_features(), FeatureSnapshot::default());
    }

    #[test]
    fn test_binding_resets_smoothing() {
        let mut router = SourceRouter::default();
        let (loud, _) = constant(1.0);
        router.bind(loud);
        for _ in 0..30 {
            router.current_features();
        }

        let (silent, _) = constant(0.0);
        router.bind(silent);
        assert_eq!(router.current_features().bands.bass, 0.0);
    }

    #[test]
    fn test_generation_change_resets_smoothing() {
        let mut router = SourceRouter::new(TuningState {
            smoothing: 0.9,
            ..TuningState::default()
        });
        let (source, generation) = constant(1.0);
        router.bind(source);
        let mut settled = 0.0;
        for _ in 0..50 {
            settled = router.current_features().bands.bass;
        }

        generation.store(1, Ordering::SeqCst);
        let first_after_reload = router.current_features().bands.bass;
        assert!(first_after_reload < settled * 0.5);
    }

    #[test]
    fn test_tuning_update_reaches_source() {
        let mut router = SourceRouter::default();
        let supplier = ScriptedSupplier::new([]);
        router.bind(Box::new(LiveSource::new(supplier, TickTiming::WallClock)));
        router.set_tuning(&TuningUpdate {
            smoothing: Some(0.3),
            ..TuningUpdate::default()
        });
        assert_eq!(router.tuning().smoothing, 0.3);
    }

    #[test]
    fn test_identical_replays_are_bit_identical() {
        let levels: Vec<f32> = (0..120).map(|i| ((i as f32 * 0.37).sin() * 0.5 + 0.5) * 0.8).collect();
        let step = Duration::from_secs_f32(1.0 / 60.0);

        let run = |levels: &[f32]| {
            let mut router = SourceRouter::default();
            let supplier = ScriptedSupplier::new(levels.iter().copied());
            router.bind(Box::new(LiveSource::new(supplier, TickTiming::Fixed(step))));
            (0..levels.len())
                .map(|_| router.current_features())
                .collect::<Vec<_>>()
        };

        let first = run(&levels);
        let second = run(&levels);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            for band in Band::ALL {
                assert_eq!(a.bands.get(band).to_bits(), b.bands.get(band).to_bits());
            }
            assert_eq!(a.metrics.beat_pulse.to_bits(), b.metrics.beat_pulse.to_bits());
            assert_eq!(a.metrics.spectral_flux.to_bits(), b.metrics.spectral_flux.to_bits());
        }
    }

    #[test]
    fn test_shaped_output_stays_in_unit_range() {
        let mut router = SourceRouter::new(TuningState {
            sensitivity: 2.0,
            bias: 0.3,
            ..TuningState::default()
        });
        let levels = (0..200).map(|i| (i % 7) as f32 / 6.0);
        router.bind(Box::new(LiveSource::new(
            ScriptedSupplier::new(levels),
            TickTiming::Fixed(Duration::from_millis(16)),
        )));
        for _ in 0..200 {
            let snapshot = router.current_features();
            for band in Band::ALL {
                assert!((0.0..=1.0).contains(&snapshot.bands.get(band)));
            }
            assert!((0.0..=1.0).contains(&snapshot.metrics.beat_pulse));
        }
    }
}
