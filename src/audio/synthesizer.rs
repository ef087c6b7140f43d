use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::analysis_api::{AnalysisApi, AudioAnalysisResponse, AudioFeaturesResponse, SegmentResponse};
use super::FeatureSnapshot;

/// Fixed low-latency smoothing applied to every remote tier before the
/// shaper sees it. Masks jumps at segment boundaries.
pub const TIER_SMOOTHING_ALPHA: f32 = 0.2;

const TIMBRE_DIMENSIONS: usize = 12;
const WARMTH_COEFFICIENT: usize = 1;
const BRIGHTNESS_COEFFICIENT: usize = 9;

const DEFAULT_TEMPO: f32 = 120.0;
const DEFAULT_DESCRIPTOR: f32 = 0.5;

/// Structural failure: no tier can run at all.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("no credential available for remote analysis")]
    MissingCredential,
    #[error("credential cannot be sent as a bearer token")]
    InvalidCredential,
}

/// What happened to a `load` call that passed the credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Committed(TierKind),
    /// A newer `load` started before this one finished; its result was dropped.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    Empty,
    SegmentAnalysis,
    TrackFeatures,
    TimeFallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start_ms: f64,
    pub duration_ms: f64,
    pub loudness: f32,
    pub timbre: [f32; TIMBRE_DIMENSIONS],
}

impl Segment {
    pub fn brightness(&self) -> f32 {
        self.timbre[BRIGHTNESS_COEFFICIENT]
    }

    pub fn warmth(&self) -> f32 {
        self.timbre[WARMTH_COEFFICIENT]
    }

    fn contains(&self, position_ms: f64) -> bool {
        position_ms >= self.start_ms && position_ms < self.start_ms + self.duration_ms
    }
}

impl From<&SegmentResponse> for Segment {
    fn from(response: &SegmentResponse) -> Self {
        let mut timbre = [0.0; TIMBRE_DIMENSIONS];
        for (slot, &value) in timbre.iter_mut().zip(&response.timbre) {
            *slot = if value.is_finite() { value } else { 0.0 };
        }

        Self {
            start_ms: response.start * 1000.0,
            duration_ms: response.duration * 1000.0,
            loudness: response.loudness_max,
            timbre,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMax {
    pub min: f32,
    pub max: f32,
}

impl MinMax {
    pub fn of(values: impl IntoIterator<Item = f32>) -> Option<Self> {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<MinMax>, v| match acc {
                None => Some(MinMax { min: v, max: v }),
                Some(mm) => Some(MinMax {
                    min: mm.min.min(v),
                    max: mm.max.max(v),
                }),
            })
    }

    /// Min-max normalization into [0,1]. A flat range maps to 0.
    pub fn normalize(&self, value: f32) -> f32 {
        let range = self.max - self.min;
        if range <= 0.0 || !value.is_finite() {
            return 0.0;
        }
        ((value - self.min) / range).clamp(0.0, 1.0)
    }
}

/// Per-track normalization bounds, computed once at load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentBounds {
    pub loudness: MinMax,
    pub brightness: MinMax,
    pub warmth: MinMax,
}

impl SegmentBounds {
    pub fn from_segments(segments: &[Segment]) -> Option<Self> {
        Some(Self {
            loudness: MinMax::of(segments.iter().map(|s| s.loudness))?,
            brightness: MinMax::of(segments.iter().map(|s| s.brightness()))?,
            warmth: MinMax::of(segments.iter().map(|s| s.warmth()))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackFeatures {
    pub tempo: f32,
    pub energy: f32,
    pub danceability: f32,
    pub valence: f32,
}

impl From<&AudioFeaturesResponse> for TrackFeatures {
    fn from(response: &AudioFeaturesResponse) -> Self {
        let descriptor = |v: Option<f32>| v.filter(|x| x.is_finite()).unwrap_or(DEFAULT_DESCRIPTOR);
        Self {
            tempo: response
                .tempo
                .filter(|t| t.is_finite() && *t > 0.0)
                .unwrap_or(DEFAULT_TEMPO),
            energy: descriptor(response.energy),
            danceability: descriptor(response.danceability),
            valence: descriptor(response.valence),
        }
    }
}

/// Unsmoothed tier output at one playback position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tones {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    /// Brightness proxy reported as the spectral centroid.
    pub centroid: f32,
}

/// The data backing remote synthesis. Exactly one tier is active.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisTier {
    Empty,
    SegmentAnalysis {
        segments: Vec<Segment>,
        bounds: SegmentBounds,
    },
    TrackFeatures(TrackFeatures),
    TimeFallback,
}

impl AnalysisTier {
    /// `None` when the response has no usable segments.
    pub fn from_analysis(analysis: &AudioAnalysisResponse) -> Option<Self> {
        let mut segments: Vec<Segment> = analysis
            .segments
            .iter()
            .map(Segment::from)
            .filter(|s| s.start_ms.is_finite() && s.duration_ms.is_finite())
            .collect();
        if segments.is_empty() {
            return None;
        }
        segments.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));
        let bounds = SegmentBounds::from_segments(&segments)?;
        Some(AnalysisTier::SegmentAnalysis { segments, bounds })
    }

    pub fn kind(&self) -> TierKind {
        match self {
            AnalysisTier::Empty => TierKind::Empty,
            AnalysisTier::SegmentAnalysis { .. } => TierKind::SegmentAnalysis,
            AnalysisTier::TrackFeatures(_) => TierKind::TrackFeatures,
            AnalysisTier::TimeFallback => TierKind::TimeFallback,
        }
    }

    /// Raw tier output at `position_ms`, or `None` for `Empty`.
    pub fn tones_at(&self, position_ms: f64) -> Option<Tones> {
        let position_ms = if position_ms.is_finite() { position_ms.max(0.0) } else { 0.0 };
        let t = position_ms / 1000.0;

        match self {
            AnalysisTier::Empty => None,
            AnalysisTier::SegmentAnalysis { segments, bounds } => {
                let segment = Self::segment_at(segments, position_ms)?;
                let brightness = bounds.brightness.normalize(segment.brightness());
                Some(Tones {
                    bass: bounds.warmth.normalize(segment.warmth()),
                    mid: bounds.loudness.normalize(segment.loudness),
                    treble: brightness,
                    centroid: brightness,
                })
            }
            AnalysisTier::TrackFeatures(features) => {
                let beats_per_sec = features.tempo as f64 / 60.0;
                let phase = (t * beats_per_sec).rem_euclid(1.0);
                let beat_pulse = (-10.0 * phase.min(1.0 - phase)).exp() as f32;
                let t = t as f32;

                let bass = (0.35 + 0.65 * (0.6 * beat_pulse + 0.4 * features.danceability)).min(1.0);
                let mid = (0.2 + 0.8 * (features.energy * (0.8 + 0.2 * (t * 0.5).sin()))).min(1.0);
                let treble = (0.2 + 0.8 * (features.valence * (0.7 + 0.3 * (t * 3.0).sin()))).min(1.0);
                Some(Tones {
                    bass: bass.max(0.0),
                    mid: mid.max(0.0),
                    treble: treble.max(0.0),
                    centroid: treble.max(0.0),
                })
            }
            AnalysisTier::TimeFallback => {
                let bass = (0.5 + 0.5 * (t * 2.0).sin()).abs() as f32;
                let mid = (0.5 + 0.5 * (t * 0.7 + 1.3).sin()).abs() as f32;
                let treble = (0.5 + 0.5 * (t * 5.0 + 0.7).sin()).abs() as f32;
                Some(Tones {
                    bass,
                    mid,
                    treble,
                    centroid: treble,
                })
            }
        }
    }

    // First segment (by start) covering the position, or the last one when
    // past the end or inside a gap. Only segments starting at or before the
    // position can cover it, so the scan stops there.
    fn segment_at(segments: &[Segment], position_ms: f64) -> Option<&Segment> {
        let after = segments.partition_point(|s| s.start_ms <= position_ms);
        segments[..after]
            .iter()
            .find(|s| s.contains(position_ms))
            .or_else(|| segments.last())
    }
}

struct TierSmoother {
    last: Tones,
}

impl TierSmoother {
    fn new() -> Self {
        Self {
            last: Tones::default(),
        }
    }

    fn step(&mut self, target: Tones) -> Tones {
        let a = TIER_SMOOTHING_ALPHA;
        self.last.bass += a * (target.bass - self.last.bass);
        self.last.mid += a * (target.mid - self.last.mid);
        self.last.treble += a * (target.treble - self.last.treble);
        self.last.centroid = target.centroid;
        self.last
    }
}

struct CommittedState {
    tier: AnalysisTier,
    smoother: TierSmoother,
}

/// Produces features for a track whose audio plays somewhere this process
/// cannot tap, from remote analysis data of decreasing fidelity.
///
/// `load` is the only suspending operation. `evaluate` is a short,
/// synchronous read of whatever tier was last committed, so a render loop
/// can keep calling it while a load is in flight.
pub struct RemoteFeatureSynthesizer {
    api: Arc<dyn AnalysisApi>,
    state: Mutex<CommittedState>,
    latest_request: AtomicU64,
    committed_generation: AtomicU64,
}

impl RemoteFeatureSynthesizer {
    pub fn new(api: Arc<dyn AnalysisApi>) -> Self {
        Self {
            api,
            state: Mutex::new(CommittedState {
                tier: AnalysisTier::Empty,
                smoother: TierSmoother::new(),
            }),
            latest_request: AtomicU64::new(0),
            committed_generation: AtomicU64::new(0),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CommittedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_credential(credential: Option<&str>) -> Result<&str, LoadError> {
        let credential = credential.map(str::trim).unwrap_or_default();
        if credential.is_empty() {
            return Err(LoadError::MissingCredential);
        }
        if credential.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(LoadError::InvalidCredential);
        }
        Ok(credential)
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.latest_request.load(Ordering::SeqCst) == ticket
    }

    /// Select a tier for `track_id`. Only a missing or unusable credential
    /// is reported; every fetch failure degrades to the next tier.
    ///
    /// Every call supersedes loads still in flight, including one that fails
    /// its credential check.
    pub async fn load(&self, track_id: &str, credential: Option<&str>) -> Result<LoadOutcome, LoadError> {
        let ticket = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
        let credential = Self::check_credential(credential).map_err(|e| {
            log::warn!("Cannot load {} (request {}): {}", track_id, ticket, e);
            e
        })?;
        log::info!("Loading remote analysis for track {} (request {})", track_id, ticket);

        match self.api.audio_analysis(track_id, credential).await {
            Ok(analysis) => match AnalysisTier::from_analysis(&analysis) {
                Some(tier) => return Ok(self.commit(ticket, track_id, tier)),
                None => log::warn!("Analysis for {} has no usable segments", track_id),
            },
            Err(e) => log::warn!("Segment analysis unavailable for {}: {}", track_id, e),
        }

        if !self.is_current(ticket) {
            log::debug!("Request {} superseded before feature fetch", ticket);
            return Ok(LoadOutcome::Superseded);
        }

        match self.api.audio_features(track_id, credential).await {
            Ok(features) => {
                let tier = AnalysisTier::TrackFeatures(TrackFeatures::from(&features));
                return Ok(self.commit(ticket, track_id, tier));
            }
            Err(e) => log::warn!("Track features unavailable for {}: {}", track_id, e),
        }

        Ok(self.commit(ticket, track_id, AnalysisTier::TimeFallback))
    }

    fn commit(&self, ticket: u64, track_id: &str, tier: AnalysisTier) -> LoadOutcome {
        let mut state = self.lock_state();
        if !self.is_current(ticket) {
            log::debug!("Discarding {:?} for {} (request {} superseded)", tier.kind(), track_id, ticket);
            return LoadOutcome::Superseded;
        }

        let kind = tier.kind();
        log::info!("Remote analysis tier for {}: {:?}", track_id, kind);
        state.tier = tier;
        state.smoother = TierSmoother::new();
        self.committed_generation.store(ticket, Ordering::SeqCst);
        LoadOutcome::Committed(kind)
    }

    pub fn tier_kind(&self) -> TierKind {
        self.lock_state().tier.kind()
    }

    /// Request id of the load whose tier is currently committed (0 if none).
    pub fn generation(&self) -> u64 {
        self.committed_generation.load(Ordering::SeqCst)
    }

    /// Features at `position_ms` of the committed track. Never fails; the
    /// `Empty` tier yields the all-zero snapshot.
    pub fn evaluate(&self, position_ms: f64) -> FeatureSnapshot {
        let mut state = self.lock_state();
        let tones = match state.tier.tones_at(position_ms) {
            Some(tones) => tones,
            None => return FeatureSnapshot::default(),
        };
        let smoothed = state.smoother.step(tones);

        let mut snapshot = FeatureSnapshot::default();
        snapshot.bands.bass = smoothed.bass;
        snapshot.bands.mid = smoothed.mid;
        snapshot.bands.treble = smoothed.treble;
        snapshot.bands.vocal = smoothed.mid;
        snapshot.metrics.energy = smoothed.mid;
        snapshot.metrics.centroid = smoothed.centroid;
        snapshot
    }
}
