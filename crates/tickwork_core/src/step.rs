//! # Simulated Time
//!
//! A `Step` is the scalar the run loop advances once per tick. It is what
//! systems receive as their `dt`.

use std::time::{SystemTime, UNIX_EPOCH};

/// Accumulated simulated time plus the wall-clock second of the last change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Step {
    /// Simulated time value.
    value: f64,
    /// Unix seconds at the last increment/decrement.
    current: i64,
}

impl Step {
    /// Creates a step starting at `value`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            value,
            current: now(),
        }
    }

    /// Advances by `amount`.
    #[inline]
    pub fn increment(&mut self, amount: f64) {
        self.value += amount;
        self.current = now();
    }

    /// Moves back by `amount`.
    #[inline]
    pub fn decrement(&mut self, amount: f64) {
        self.value -= amount;
        self.current = now();
    }

    /// Returns the simulated time value.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Returns the unix second of the last change.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> i64 {
        self.current
    }

    /// Returns the value as the integer `dt` handed to systems.
    ///
    /// Fractional parts are truncated; out-of-range values saturate.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_dt(&self) -> i64 {
        self.value as i64
    }

    /// Returns true once the value has reached `end` moving in the
    /// direction of `increment`.
    #[must_use]
    pub fn reached(&self, end: f64, increment: f64) -> bool {
        if increment >= 0.0 {
            self.value >= end
        } else {
            self.value <= end
        }
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
