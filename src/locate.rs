//! "Find my car" beep pattern on the dedicated locate buzzer.

use log::{debug, info};

use crate::{elapsed, Duration, Instant, SPOT_COUNT};

/// Half periods in one locate pattern, three audible pulses.
pub const LOCATE_HALF_PERIODS: u8 = 6;

/// What the locate stage wants from the buzzers this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateAction {
    /// Locate tone on.
    ToneOn,
    /// Locate tone off, maneuver tone off as well.
    ToneOff,
    /// Pattern done: both tones off and the maneuver phase restarted.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeepSequence {
    remaining: u8,
    last_toggle: Option<Instant>,
}

impl BeepSequence {
    pub fn remaining(&self) -> u8 {
        self.remaining
    }
}

#[derive(Debug, Clone)]
pub struct LocateSequencer {
    half_period: Duration,
    active: Option<BeepSequence>,
}

impl LocateSequencer {
    pub fn new(half_period: Duration) -> Self {
        Self {
            half_period,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&BeepSequence> {
        self.active.as_ref()
    }

    /// Arms the pattern for any requested spot that is occupied.
    ///
    /// Requests against empty spots are dropped. Returns whether a pattern
    /// was armed.
    pub fn handle_requests(
        &mut self,
        requests: [bool; SPOT_COUNT],
        occupied: [bool; SPOT_COUNT],
    ) -> bool {
        let mut armed = false;
        for (idx, (requested, occupied)) in requests.into_iter().zip(occupied).enumerate() {
            if !requested {
                continue;
            }
            if occupied {
                info!("locate spot {}", idx + 1);
                armed = true;
            } else {
                debug!("locate spot {} ignored, spot is empty", idx + 1);
            }
        }

        if armed {
            let last_toggle = self.active.and_then(|seq| seq.last_toggle);
            self.active = Some(BeepSequence {
                remaining: LOCATE_HALF_PERIODS,
                last_toggle,
            });
        }
        armed
    }

    /// Advances the pattern when a half period has passed.
    pub fn tick(&mut self, now: Instant) -> Option<LocateAction> {
        let seq = self.active.as_mut()?;
        let due = seq
            .last_toggle
            .map_or(true, |last| elapsed(now, last) >= self.half_period);
        if !due {
            return None;
        }

        if seq.remaining == 0 {
            self.active = None;
            debug!("locate pattern finished");
            return Some(LocateAction::Finished);
        }

        let action = if seq.remaining % 2 != 0 {
            LocateAction::ToneOn
        } else {
            LocateAction::ToneOff
        };
        seq.remaining -= 1;
        seq.last_toggle = Some(now);
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LocateAction::*;

    fn at(ms: u64) -> Instant {
        Instant::from_ticks(ms * 1000)
    }

    #[test]
    fn request_on_empty_spot_arms_nothing() {
        let mut locate = LocateSequencer::new(Duration::millis(200));
        assert!(!locate.handle_requests([true, false], [false, true]));
        assert!(locate.active().is_none());
        assert_eq!(locate.tick(at(0)), None);
    }

    #[test]
    fn plays_three_pulses_then_finishes() {
        let mut locate = LocateSequencer::new(Duration::millis(200));
        assert!(locate.handle_requests([false, true], [false, true]));
        assert_eq!(locate.active().map(|s| s.remaining()), Some(6));

        let actions: Vec<_> = (0..15).filter_map(|i| locate.tick(at(i * 100))).collect();
        assert_eq!(
            actions,
            [ToneOff, ToneOn, ToneOff, ToneOn, ToneOff, ToneOn, Finished]
        );
        assert!(locate.active().is_none());
    }

    #[test]
    fn toggles_only_every_half_period() {
        let mut locate = LocateSequencer::new(Duration::millis(200));
        locate.handle_requests([true, false], [true, false]);
        assert_eq!(locate.tick(at(0)), Some(ToneOff));
        assert_eq!(locate.tick(at(100)), None);
        assert_eq!(locate.tick(at(199)), None);
        assert_eq!(locate.tick(at(200)), Some(ToneOn));
    }

    #[test]
    fn new_request_restarts_countdown() {
        let mut locate = LocateSequencer::new(Duration::millis(200));
        locate.handle_requests([true, false], [true, false]);
        locate.tick(at(0));
        locate.tick(at(200));
        assert_eq!(locate.active().map(|s| s.remaining()), Some(4));

        locate.handle_requests([true, false], [true, false]);
        assert_eq!(locate.active().map(|s| s.remaining()), Some(6));
        // cadence continues from the previous toggle
        assert_eq!(locate.tick(at(300)), None);
        assert_eq!(locate.tick(at(400)), Some(ToneOff));
    }
}
