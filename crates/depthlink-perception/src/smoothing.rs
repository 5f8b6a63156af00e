//! Exponentially weighted moving average over obstacle distance.
//!
//! ```text
//! smoothed = α · raw + (1 − α) · smoothed_prev
//! ```
//!
//! A small α favours stability over responsiveness: a single spurious
//! detection nudges the streamed distance instead of snapping it.
//!
//! # Example
//!
//! ```rust
//! use depthlink_perception::smoothing::DistanceSmoother;
//!
//! let mut s = DistanceSmoother::new(0.2, 10.0);
//! let out = s.update(1.2);
//! assert!((out - 8.24).abs() < 1e-5);
//! ```

/// Recursive low-pass filter holding the current smoothed distance.
#[derive(Debug, Clone)]
pub struct DistanceSmoother {
    /// Weight of the newest sample (0–1).
    alpha: f32,
    value: f32,
}

impl DistanceSmoother {
    /// Create a filter with weight `alpha` (clamped to `[0, 1]`) starting at
    /// `initial`.
    pub fn new(alpha: f32, initial: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: initial,
        }
    }

    /// Fold one raw sample into the average and return the new value.
    pub fn update(&mut self, raw: f32) -> f32 {
        self.value = self.alpha * raw + (1.0 - self.alpha) * self.value;
        self.value
    }

    /// Current smoothed value.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Overwrite the state, discarding all history.
    pub fn reset(&mut self, value: f32) {
        self.value = value;
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}
