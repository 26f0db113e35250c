//! Barrier gate state machine.
//!
//! The gate goes LOWERED as soon as either spot sees something in TRANSIT and
//! returns to RAISED once both spots have stayed out of TRANSIT for the settle
//! time. Commands are only emitted on an actual transition.

use log::info;

use crate::config::ParkingConfig;
use crate::zone::GateZone;
use crate::{elapsed, Duration, Instant, SPOT_COUNT};

pub const RAISED_ANGLE: u8 = 0;
pub const LOWERED_ANGLE: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePosition {
    Raised,
    Lowered,
}

impl GatePosition {
    pub fn angle(&self) -> u8 {
        match self {
            GatePosition::Raised => RAISED_ANGLE,
            GatePosition::Lowered => LOWERED_ANGLE,
        }
    }

    /// Status LED levels for this position.
    pub fn leds(&self) -> StatusLeds {
        match self {
            GatePosition::Raised => StatusLeds {
                green: true,
                red: false,
            },
            GatePosition::Lowered => StatusLeds {
                green: false,
                red: true,
            },
        }
    }
}

/// Mutually exclusive status LED levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLeds {
    pub green: bool,
    pub red: bool,
}

/// Actuator command issued on a gate transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateCommand {
    pub position: GatePosition,
    pub servo_angle: u8,
    pub leds: StatusLeds,
}

impl From<GatePosition> for GateCommand {
    fn from(position: GatePosition) -> Self {
        Self {
            position,
            servo_angle: position.angle(),
            leds: position.leds(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateController {
    position: GatePosition,
    settle: Duration,
    /// Start of the current run of ticks with no spot in TRANSIT.
    calm_since: Option<Instant>,
}

impl GateController {
    pub fn new(settle: Duration) -> Self {
        Self {
            position: GatePosition::Raised,
            settle,
            calm_since: None,
        }
    }

    pub fn position(&self) -> GatePosition {
        self.position
    }

    /// Command that puts the actuators in line with the current state, used at boot.
    pub fn current_command(&self) -> GateCommand {
        self.position.into()
    }

    /// Evaluates both spots for this tick.
    pub fn update(
        &mut self,
        distances_mm: [u16; SPOT_COUNT],
        config: &ParkingConfig,
        now: Instant,
    ) -> Option<GateCommand> {
        let zones = distances_mm.map(|d| GateZone::classify(d, config));
        self.evaluate(zones, now)
    }

    pub fn evaluate(&mut self, zones: [GateZone; SPOT_COUNT], now: Instant) -> Option<GateCommand> {
        let transit = zones.iter().any(|z| *z == GateZone::Transit);

        if transit {
            self.calm_since = None;
            if self.position == GatePosition::Raised {
                return Some(self.transition(GatePosition::Lowered, zones));
            }
            return None;
        }

        let calm_since = *self.calm_since.get_or_insert(now);
        if self.position == GatePosition::Lowered && elapsed(now, calm_since) >= self.settle {
            return Some(self.transition(GatePosition::Raised, zones));
        }
        None
    }

    fn transition(&mut self, to: GatePosition, zones: [GateZone; SPOT_COUNT]) -> GateCommand {
        info!("gate {:?} -> {:?} (zones {:?})", self.position, to, zones);
        self.position = to;
        to.into()
    }
}
