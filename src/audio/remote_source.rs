use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::{FeatureSnapshot, FeatureSource, RemoteFeatureSynthesizer};

#[derive(Debug, Clone, Copy)]
struct ClockState {
    position_ms: f64,
    paused: bool,
    reported_at: Instant,
}

/// Approximate playback position of a remote player.
///
/// The player reports its position now and then; between reports the
/// position is extrapolated from wall-clock time unless playback is paused.
/// Cloning shares the same clock.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    state: Arc<Mutex<Option<ClockState>>>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// Record a player state report.
    pub fn update(&self, position_ms: f64, paused: bool) {
        let position_ms = if position_ms.is_finite() { position_ms.max(0.0) } else { 0.0 };
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        *state = Some(ClockState {
            position_ms,
            paused,
            reported_at: Instant::now(),
        });
    }

    /// Forget the last report, e.g. when the player disconnects.
    pub fn clear(&self) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub fn is_paused(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.map(|s| s.paused).unwrap_or(true)
    }

    /// 0 until the first report.
    pub fn position_ms(&self) -> f64 {
        self.position_at(Instant::now())
    }

    fn position_at(&self, now: Instant) -> f64 {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match *state {
            None => 0.0,
            Some(s) if s.paused => s.position_ms,
            Some(s) => s.position_ms + now.saturating_duration_since(s.reported_at).as_secs_f64() * 1000.0,
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Feature source backed by remote synthesis at the clock's position.
pub struct RemoteSource {
    synthesizer: Arc<RemoteFeatureSynthesizer>,
    clock: PlaybackClock,
}

impl RemoteSource {
    pub fn new(synthesizer: Arc<RemoteFeatureSynthesizer>, clock: PlaybackClock) -> Self {
        Self { synthesizer, clock }
    }
}

impl FeatureSource for RemoteSource {
    fn raw_features(&mut self) -> FeatureSnapshot {
        self.synthesizer.evaluate(self.clock.position_ms())
    }

    fn generation(&self) -> u64 {
        self.synthesizer.generation()
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis_api::{
        AnalysisApi, AudioAnalysisResponse, AudioFeaturesResponse, FetchError,
    };
    use crate::audio::{SourceRouter, TierKind};
    use async_trait::async_trait;
    use std::time::Duration;

    struct OfflineApi;

    #[async_trait]
    impl AnalysisApi for OfflineApi {
        async fn audio_analysis(&self, _: &str, _: &str) -> Result<AudioAnalysisResponse, FetchError> {
            Err(FetchError::Status { endpoint: "audio-analysis", status: 401 })
        }

        async fn audio_features(&self, _: &str, _: &str) -> Result<AudioFeaturesResponse, FetchError> {
            Err(FetchError::Status { endpoint: "audio-features", status: 401 })
        }
    }

    #[test]
    fn test_clock_starts_at_zero() {
        let clock = PlaybackClock::new();
        assert_eq!(clock.position_ms(), 0.0);
        assert!(clock.is_paused());
    }

    #[test]
    fn test_paused_clock_holds_position() {
        let clock = PlaybackClock::new();
        clock.update(4200.0, true);
        let later = Instant::now() + Duration::from_millis(500);
        assert_eq!(clock.position_at(later), 4200.0);
    }

    #[test]
    fn test_playing_clock_extrapolates() {
        let clock = PlaybackClock::new();
        clock.update(1000.0, false);
        let later = Instant::now() + Duration::from_millis(250);
        let position = clock.position_at(later);
        assert!(position >= 1250.0 && position < 1300.0, "position {}", position);

        let shared = clock.clone();
        shared.clear();
        assert_eq!(clock.position_ms(), 0.0);
    }

    #[tokio::test]
    async fn test_remote_source_through_router() {
        let synthesizer = Arc::new(RemoteFeatureSynthesizer::new(Arc::new(OfflineApi)));
        let clock = PlaybackClock::new();
        let mut router = SourceRouter::default();
        router.bind(Box::new(RemoteSource::new(Arc::clone(&synthesizer), clock.clone())));

        // Nothing committed yet
        assert_eq!(router.current_features(), FeatureSnapshot::default());

        synthesizer.load("track", Some("expired-token")).await.unwrap();
        assert_eq!(synthesizer.tier_kind(), TierKind::TimeFallback);

        clock.update(800.0, true);
        let snapshot = router.current_features();
        assert!(snapshot.bands.bass > 0.0);
        assert_eq!(snapshot.bands.sub, 0.0);
        assert_eq!(snapshot.metrics.zero_crossing_rate, 0.0);
    }
}
