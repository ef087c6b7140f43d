use super::{Band, FeatureSnapshot, Signal};
use serde::{Deserialize, Serialize};

/// Upper bound applied to `smoothing` before use so the EMA always converges.
pub const MAX_SMOOTHING: f32 = 0.95;

/// User-facing shaping parameters shared by every signal.
///
/// `shaped = clamp(clamp_min, clamp_max, (raw + bias) * sensitivity) ^ gamma`,
/// then `out = prev + (1 - smoothing) * (shaped - prev)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TuningState {
    /// Gain multiplier, typically 0.2-2.0
    pub sensitivity: f32,
    /// EMA retention factor, 0-0.95
    pub smoothing: f32,
    pub clamp_min: f32,
    /// Upper bound after gain, 0.5-1.0
    pub clamp_max: f32,
    /// Power-law exponent, 0.5-1.5. Below 1 compresses highs toward 1.
    pub gamma: f32,
    pub bias: f32,
}

impl Default for TuningState {
    fn default() -> Self {
        Self {
            sensitivity: 0.85,
            smoothing: 0.65,
            clamp_min: 0.0,
            clamp_max: 0.9,
            gamma: 0.85,
            bias: 0.0,
        }
    }
}

/// Partial tuning change. Fields left as `None` keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningUpdate {
    pub sensitivity: Option<f32>,
    pub smoothing: Option<f32>,
    pub clamp_min: Option<f32>,
    pub clamp_max: Option<f32>,
    pub gamma: Option<f32>,
    pub bias: Option<f32>,
}

impl TuningState {
    pub fn apply(&mut self, update: &TuningUpdate) {
        fn merge(field: &mut f32, value: Option<f32>, name: &str) {
            match value {
                Some(v) if v.is_finite() => *field = v,
                Some(v) => log::warn!("Ignoring non-finite tuning value {}={}", name, v),
                None => {}
            }
        }

        merge(&mut self.sensitivity, update.sensitivity, "sensitivity");
        merge(&mut self.smoothing, update.smoothing, "smoothing");
        merge(&mut self.clamp_min, update.clamp_min, "clampMin");
        merge(&mut self.clamp_max, update.clamp_max, "clampMax");
        merge(&mut self.gamma, update.gamma, "gamma");
        merge(&mut self.bias, update.bias, "bias");
    }

    /// Smoothing clamped into the range where the EMA still moves.
    pub fn effective_smoothing(&self) -> f32 {
        if self.smoothing.is_finite() {
            self.smoothing.clamp(0.0, MAX_SMOOTHING)
        } else {
            0.0
        }
    }

    /// Gain, bias, clamp and gamma without any smoothing.
    pub fn shape(&self, raw: f32) -> f32 {
        let raw = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
        // Bounds kept inside [0,1] so powf never sees a negative base.
        // Non-finite bounds would make clamp panic.
        let min = if self.clamp_min.is_finite() { self.clamp_min.clamp(0.0, 1.0) } else { 0.0 };
        let max = if self.clamp_max.is_finite() { self.clamp_max.clamp(min, 1.0) } else { 1.0 };
        let gained = ((raw + self.bias) * self.sensitivity).clamp(min, max);
        let shaped = gained.powf(self.gamma.max(f32::EPSILON));
        if shaped.is_finite() {
            shaped
        } else {
            0.0
        }
    }
}

/// Gain/clamp/gamma/EMA stage applied identically to live and synthesized
/// features. Owns one EMA accumulator per [`Signal`].
pub struct SignalShaper {
    tuning: TuningState,
    accumulators: [f32; Signal::COUNT],
    frame_counter: u32,
}

impl SignalShaper {
    pub fn new(tuning: TuningState) -> Self {
        Self {
            tuning,
            accumulators: [0.0; Signal::COUNT],
            frame_counter: 0,
        }
    }

    pub fn tuning(&self) -> &TuningState {
        &self.tuning
    }

    pub fn set_tuning(&mut self, update: &TuningUpdate) {
        self.tuning.apply(update);
        log::info!("Tuning updated: {:?}", self.tuning);
    }

    /// Clear every accumulator. Called when the material being analysed changes.
    pub fn reset(&mut self) {
        self.accumulators = [0.0; Signal::COUNT];
    }

    /// Shape and smooth one scalar, updating that signal's accumulator.
    pub fn process(&mut self, signal: Signal, raw: f32) -> f32 {
        let target = match signal {
            // The pulse already has a designed envelope, only smooth it.
            Signal::Beat => {
                if raw.is_finite() {
                    raw.clamp(0.0, 1.0)
                } else {
                    0.0
                }
            }
            _ => self.tuning.shape(raw),
        };
        self.smooth(signal, target)
    }

    fn smooth(&mut self, signal: Signal, value: f32) -> f32 {
        let alpha = 1.0 - self.tuning.effective_smoothing();
        let slot = &mut self.accumulators[signal.index()];
        *slot += alpha * (value - *slot);
        *slot
    }

    pub fn shape_snapshot(&mut self, raw: &FeatureSnapshot) -> FeatureSnapshot {
        let mut out = FeatureSnapshot::default();
        for band in Band::ALL {
            let value = self.process(Signal::Band(band), raw.bands.get(band));
            out.bands.set(band, value);
        }

        out.metrics.energy = self.process(Signal::Energy, raw.metrics.energy);
        out.metrics.centroid = self.process(Signal::Centroid, raw.metrics.centroid);
        out.metrics.spectral_flux = self.process(Signal::Flux, raw.metrics.spectral_flux);
        out.metrics.zero_crossing_rate = self.process(Signal::Zcr, raw.metrics.zero_crossing_rate);
        out.metrics.beat_pulse = self.process(Signal::Beat, raw.metrics.beat_pulse);

        self.frame_counter = self.frame_counter.wrapping_add(1);
        if self.frame_counter % 120 == 0 {
            log::debug!(
                "Shaped features: bass={:.3} mid={:.3} treble={:.3} energy={:.3} beat={:.3}",
                out.bands.bass,
                out.bands.mid,
                out.bands.treble,
                out.metrics.energy,
                out.metrics.beat_pulse
            );
        }

        out
    }
}

impl Default for SignalShaper {
    fn default() -> Self {
        Self::new(TuningState::default())
    }
}
