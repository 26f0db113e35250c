//! Debounce filter for the ultrasonic channel plus sentinel normalization.
//!
//! Small moves are tracked immediately. A jump larger than
//! [`MAX_STEP_MM`] is only adopted once it has been seen on
//! [`CONFIRM_TICKS`] consecutive ticks, which drops the single-sample spikes
//! typical of multi-path or weak echoes.

use crate::ranging::RANGE_TIMEOUT;
use crate::FAR_MM;

pub const MAX_STEP_MM: u16 = 50;
pub const CONFIRM_TICKS: u8 = 3;

/// Reliable band of the ultrasonic module, exclusive lower bound.
pub const ULTRASONIC_MIN_CM: f32 = 2.0;
/// Reliable band of the ultrasonic module, inclusive upper bound.
pub const ULTRASONIC_MAX_CM: f32 = 40.0;

/// Converts an ultrasonic reading to millimeters, mapping anything outside
/// the reliable band (including the no-echo sentinel) to [`FAR_MM`].
pub fn normalize_ultrasonic_cm(cm: f32) -> u16 {
    if cm.is_nan() || cm <= ULTRASONIC_MIN_CM || cm > ULTRASONIC_MAX_CM {
        FAR_MM
    } else {
        (cm * 10.0) as u16
    }
}

/// Maps the ranging sensor timeout to [`FAR_MM`]; real readings pass through.
pub fn normalize_ranging_mm(mm: u16) -> u16 {
    if mm == RANGE_TIMEOUT {
        FAR_MM
    } else {
        mm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceStabilizer {
    previous_stable: u16,
    consistent_count: u8,
}

impl Default for DistanceStabilizer {
    fn default() -> Self {
        Self::new(FAR_MM)
    }
}

impl DistanceStabilizer {
    pub fn new(initial_mm: u16) -> Self {
        Self {
            previous_stable: initial_mm,
            consistent_count: 0,
        }
    }

    /// Feeds one normalized reading and returns the stable distance.
    pub fn update(&mut self, raw_mm: u16) -> u16 {
        let delta = raw_mm.abs_diff(self.previous_stable);

        if delta > MAX_STEP_MM {
            self.consistent_count += 1;
            if self.consistent_count >= CONFIRM_TICKS {
                self.previous_stable = raw_mm;
                self.consistent_count = 0;
            }
        } else {
            self.previous_stable = raw_mm;
            self.consistent_count = 0;
        }

        self.previous_stable
    }

    pub fn stable(&self) -> u16 {
        self.previous_stable
    }
}
