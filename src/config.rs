//! Tunable thresholds and cadences.

use crate::Duration;

/// Thresholds (millimeters) and cadences used by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParkingConfig {
    /// At or below this a spot counts as PARKED for the gate.
    pub close_mm: u16,
    /// At or above this a spot counts as CLEAR for the gate.
    pub open_mm: u16,
    /// At or below this the maneuver buzzer goes quiet.
    pub stop_mm: u16,
    /// At or above this no maneuver warning is needed.
    pub free_mm: u16,
    /// Strictly below this a spot is reported as occupied.
    pub occupied_threshold_mm: u16,
    pub sensor_interval: Duration,
    pub display_interval: Duration,
    /// How long both spots must stay outside TRANSIT before the gate resets.
    pub gate_settle: Duration,
    /// Half-period of the locate beep pattern.
    pub locate_half_period: Duration,
    /// Shortest maneuver beep toggle interval.
    pub min_beep_interval: Duration,
}

impl ParkingConfig {
    /// Sensor sampling interval in whole milliseconds, used for occupancy accounting.
    pub fn tick_ms(&self) -> u32 {
        self.sensor_interval.to_millis() as u32
    }
}

impl Default for ParkingConfig {
    fn default() -> Self {
        Self {
            close_mm: 150,
            open_mm: 600,
            stop_mm: 150,
            free_mm: 800,
            occupied_threshold_mm: 150,
            sensor_interval: Duration::millis(100),
            display_interval: Duration::millis(500),
            gate_settle: Duration::millis(200),
            locate_half_period: Duration::millis(200),
            min_beep_interval: Duration::millis(40),
        }
    }
}
