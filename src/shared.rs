//! State shared between the control loop and the status responder.
//!
//! The control loop is the only writer of the snapshot; the responder is the
//! only writer of locate requests. Every access is one short critical section
//! copying a small `Copy` value, so a reader never sees a half-updated spot.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::occupancy::{OccupancySnapshot, SpotSnapshot};
use crate::SPOT_COUNT;

pub struct SharedStatus {
    snapshot: Mutex<CriticalSectionRawMutex, Cell<OccupancySnapshot>>,
    locate: Mutex<CriticalSectionRawMutex, Cell<[bool; SPOT_COUNT]>>,
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStatus {
    pub const fn new() -> Self {
        Self {
            snapshot: Mutex::new(Cell::new(OccupancySnapshot {
                spots: [SpotSnapshot {
                    occupied: false,
                    occupied_duration_seconds: 0,
                }; SPOT_COUNT],
            })),
            locate: Mutex::new(Cell::new([false; SPOT_COUNT])),
        }
    }

    pub fn publish(&self, snapshot: OccupancySnapshot) {
        self.snapshot.lock(|cell| cell.set(snapshot));
    }

    pub fn snapshot(&self) -> OccupancySnapshot {
        self.snapshot.lock(|cell| cell.get())
    }

    /// Flags a locate request for `spot` (zero based). Out of range spots are ignored.
    pub fn request_locate(&self, spot: usize) {
        self.locate.lock(|cell| {
            let mut flags = cell.get();
            if let Some(flag) = flags.get_mut(spot) {
                *flag = true;
            }
            cell.set(flags);
        });
    }

    /// Reads and clears both locate flags in one step.
    pub fn take_locate_requests(&self) -> [bool; SPOT_COUNT] {
        self.locate.lock(|cell| cell.replace([false; SPOT_COUNT]))
    }
}
