/// Number of energy samples kept for the adaptive threshold.
pub const HISTORY_SIZE: usize = 64;
/// Samples needed before any beat can fire.
pub const MIN_HISTORY: usize = 8;
/// Standard deviations above the mean an energy value must reach.
pub const THRESHOLD_STDEV: f32 = 1.5;
/// Absolute energy floor so near-silence never triggers.
pub const ENERGY_FLOOR: f32 = 0.1;
/// Linear pulse decay in units per second.
pub const PULSE_DECAY_PER_SEC: f32 = 2.5;
/// Pulse increment on a detected beat.
pub const PULSE_KICK: f32 = 0.9;

/// Adaptive-threshold beat detector over a ring buffer of recent energy
/// values, producing a decaying pulse in [0,1].
///
/// There is no reset: a fresh detector is created whenever a new source binds.
pub struct BeatDetector {
    energy_history: [f32; HISTORY_SIZE],
    write_index: usize,
    filled: bool,
    pulse: f32,
}

impl BeatDetector {
    pub fn new() -> Self {
        Self {
            energy_history: [0.0; HISTORY_SIZE],
            write_index: 0,
            filled: false,
            pulse: 0.0,
        }
    }

    /// Push one energy value and advance the pulse by `dt_secs` of wall time.
    /// Returns `(beat_detected, pulse)`.
    pub fn update(&mut self, energy: f32, dt_secs: f32) -> (bool, f32) {
        let energy = if energy.is_finite() { energy } else { 0.0 };

        self.energy_history[self.write_index] = energy;
        self.write_index += 1;
        if self.write_index >= HISTORY_SIZE {
            self.write_index = 0;
            self.filled = true;
        }

        let len = self.len();
        if len < MIN_HISTORY {
            return (false, self.pulse);
        }

        let history = &self.energy_history[..len];
        let mean = history.iter().sum::<f32>() / len as f32;
        let variance = Self::calculate_variance(history, mean);
        let threshold = mean + THRESHOLD_STDEV * variance.sqrt();
        let beat_detected = energy > threshold && energy > ENERGY_FLOOR;

        let dt = dt_secs.max(0.001);
        self.pulse = (self.pulse - PULSE_DECAY_PER_SEC * dt).max(0.0);
        if beat_detected {
            self.pulse = (self.pulse + PULSE_KICK).min(1.0);
        }

        (beat_detected, self.pulse)
    }

    pub fn pulse(&self) -> f32 {
        self.pulse
    }

    /// Number of valid samples in the ring buffer.
    pub fn len(&self) -> usize {
        if self.filled {
            HISTORY_SIZE
        } else {
            self.write_index
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Population variance over the valid samples.
    fn calculate_variance(data: &[f32], mean: f32) -> f32 {
        if data.is_empty() {
            return 0.0;
        }

        let sum_sq_diff: f32 = data.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / data.len() as f32
    }
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new()
    }
}
