//! Per-spot occupancy and occupied-time accounting.

use log::info;

use crate::SPOT_COUNT;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpotStatus {
    pub occupied: bool,
    pub occupied_duration_ms: u32,
}

/// What the status responder sees for one spot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpotSnapshot {
    pub occupied: bool,
    pub occupied_duration_seconds: u32,
}

impl From<SpotStatus> for SpotSnapshot {
    fn from(status: SpotStatus) -> Self {
        Self {
            occupied: status.occupied,
            occupied_duration_seconds: status.occupied_duration_ms / 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OccupancySnapshot {
    pub spots: [SpotSnapshot; SPOT_COUNT],
}

/// Sharp threshold, no hysteresis; the gate applies its own.
#[derive(Debug, Clone)]
pub struct OccupancyTracker {
    threshold_mm: u16,
    spots: [SpotStatus; SPOT_COUNT],
}

impl OccupancyTracker {
    pub fn new(threshold_mm: u16) -> Self {
        Self {
            threshold_mm,
            spots: [SpotStatus::default(); SPOT_COUNT],
        }
    }

    pub fn update(&mut self, distances_mm: [u16; SPOT_COUNT], tick_ms: u32) {
        for (idx, (spot, distance)) in self.spots.iter_mut().zip(distances_mm).enumerate() {
            let occupied = distance < self.threshold_mm;
            if occupied != spot.occupied {
                info!("spot {} {}", idx + 1, if occupied { "occupied" } else { "vacated" });
            }

            spot.occupied = occupied;
            spot.occupied_duration_ms = if occupied {
                spot.occupied_duration_ms.saturating_add(tick_ms)
            } else {
                0
            };
        }
    }

    pub fn spot(&self, idx: usize) -> SpotStatus {
        self.spots[idx]
    }

    pub fn occupied(&self) -> [bool; SPOT_COUNT] {
        self.spots.map(|s| s.occupied)
    }

    pub fn snapshot(&self) -> OccupancySnapshot {
        OccupancySnapshot {
            spots: self.spots.map(SpotSnapshot::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_accumulates_and_resets() {
        let mut tracker = OccupancyTracker::new(150);
        tracker.update([120, 9999], 100);
        tracker.update([120, 9999], 100);
        tracker.update([149, 9999], 100);
        assert_eq!(
            tracker.spot(0),
            SpotStatus {
                occupied: true,
                occupied_duration_ms: 300
            }
        );
        assert_eq!(tracker.spot(1), SpotStatus::default());

        tracker.update([150, 9999], 100);
        assert_eq!(tracker.spot(0), SpotStatus::default());
    }

    #[test]
    fn duration_is_monotonic_while_occupied() {
        let mut tracker = OccupancyTracker::new(150);
        let readings = [100, 90, 140, 200, 100, 100, 9999, 10, 10];
        let mut last = 0;
        for d in readings {
            tracker.update([9999, d], 100);
            let spot = tracker.spot(1);
            if spot.occupied {
                assert!(spot.occupied_duration_ms > last);
            } else {
                assert_eq!(spot.occupied_duration_ms, 0);
            }
            last = spot.occupied_duration_ms;
        }
    }

    #[test]
    fn snapshot_reports_whole_seconds() {
        let mut tracker = OccupancyTracker::new(150);
        for _ in 0..25 {
            tracker.update([100, 100], 100);
        }
        tracker.update([100, 9999], 100);
        let snap = tracker.snapshot();
        assert_eq!(
            snap.spots[0],
            SpotSnapshot {
                occupied: true,
                occupied_duration_seconds: 2
            }
        );
        assert!(!snap.spots[1].occupied);
        assert_eq!(snap.spots[1].occupied_duration_seconds, 0);
    }
}
