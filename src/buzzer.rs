//! Parking-sensor style maneuver beeping.

use log::debug;

use crate::config::ParkingConfig;
use crate::zone::BuzzerZone;
use crate::{elapsed, Duration, Instant, SPOT_COUNT};

/// Square-wave beeper whose period shrinks as the obstacle gets closer.
#[derive(Debug, Clone, Default)]
pub struct ManeuverBuzzerController {
    tone_on: bool,
    last_toggle: Option<Instant>,
}

impl ManeuverBuzzerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tone_on(&self) -> bool {
        self.tone_on
    }

    /// Silences the tone but keeps the phase; the next toggle turns it back on.
    pub fn silence(&mut self) {
        self.tone_on = false;
    }

    /// Silences the tone and restarts the beep phase.
    pub fn reset(&mut self) {
        self.tone_on = false;
        self.last_toggle = None;
    }

    /// Returns whether the maneuver tone should sound after this tick.
    pub fn update(
        &mut self,
        distances_mm: [u16; SPOT_COUNT],
        config: &ParkingConfig,
        now: Instant,
    ) -> bool {
        let zones = distances_mm.map(|d| BuzzerZone::classify(d, config));

        if zones.contains(&BuzzerZone::Stop) {
            self.tone_on = false;
            return false;
        }

        let active = distances_mm
            .iter()
            .zip(zones)
            .filter(|(_, zone)| *zone == BuzzerZone::Maneuver)
            .map(|(d, _)| *d)
            .min();

        let Some(active_mm) = active else {
            self.tone_on = false;
            return false;
        };

        let interval = beep_interval(active_mm, config.min_beep_interval);
        let due = self
            .last_toggle
            .map_or(true, |last| elapsed(now, last) >= interval);
        if due {
            self.tone_on = !self.tone_on;
            self.last_toggle = Some(now);
            debug!("maneuver beep {} at {active_mm} mm", self.tone_on);
        }
        self.tone_on
    }
}

/// Toggle interval for a given obstacle distance: `max(min, d / 1.5)` ms.
pub fn beep_interval(distance_mm: u16, min: Duration) -> Duration {
    let interval = Duration::millis((distance_mm as f32 / 1.5) as u64);
    if interval < min {
        min
    } else {
        interval
    }
}
