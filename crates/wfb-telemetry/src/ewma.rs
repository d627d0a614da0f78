//! # Fast EWMA
//!
//! Fixed-weight exponential smoothing used for every rate, latency and
//! signal field of the aggregator:
//!
//! ```text
//! value' = PREV_WEIGHT · value + (1 − PREV_WEIGHT) · sample
//! ```
//!
//! `PREV_WEIGHT` is 0.02, so the newest sample carries 98% of the weight.
//! The filter tracks the instantaneous link state and only damps
//! single-sample jitter; it is not a long-run average.

/// Weight given to the previous smoothed value.
pub const PREV_WEIGHT: f64 = 0.02;

/// Smoothed value stored at `f32` width, starting from rest at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FastEwma {
    value: f32,
}

impl FastEwma {
    pub const fn new() -> Self {
        FastEwma { value: 0.0 }
    }

    /// Blend in a new sample and return the smoothed value.
    ///
    /// The blend is computed at `f64` precision and narrowed on store.
    pub fn update(&mut self, sample: f64) -> f32 {
        self.value = (PREV_WEIGHT * self.value as f64 + (1.0 - PREV_WEIGHT) * sample) as f32;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Overwrite the smoothed value (used when restoring a record).
    pub fn set(&mut self, value: f32) {
        self.value = value;
    }
}
