//! Distance zone classification shared by the gate, buzzer and display.

use crate::config::ParkingConfig;

/// Zones driving the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateZone {
    /// `d <= close_mm`
    Parked,
    /// `close_mm < d < open_mm`, something is moving
    Transit,
    /// `d >= open_mm`
    Clear,
}

impl GateZone {
    pub fn classify(distance_mm: u16, config: &ParkingConfig) -> Self {
        if distance_mm <= config.close_mm {
            GateZone::Parked
        } else if distance_mm < config.open_mm {
            GateZone::Transit
        } else {
            GateZone::Clear
        }
    }
}

/// Zones driving the maneuver buzzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuzzerZone {
    Stop,
    Maneuver,
    Free,
}

impl BuzzerZone {
    pub fn classify(distance_mm: u16, config: &ParkingConfig) -> Self {
        if distance_mm <= config.stop_mm {
            BuzzerZone::Stop
        } else if distance_mm < config.free_mm {
            BuzzerZone::Maneuver
        } else {
            BuzzerZone::Free
        }
    }
}

/// Status label shown per spot on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotLabel {
    Free,
    Occupied,
    Attention,
}

impl SpotLabel {
    pub fn classify(distance_mm: u16, config: &ParkingConfig) -> Self {
        if distance_mm > config.free_mm {
            SpotLabel::Free
        } else if distance_mm < config.stop_mm {
            SpotLabel::Occupied
        } else {
            SpotLabel::Attention
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpotLabel::Free => "FREE",
            SpotLabel::Occupied => "OCCUPIED",
            SpotLabel::Attention => "ATTENTION",
        }
    }
}
