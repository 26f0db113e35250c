#![cfg_attr(not(test), no_std)]

pub mod buzzer;
pub mod config;
pub mod control;
pub mod gate;
pub mod http;
pub mod locate;
pub mod occupancy;
pub mod poll;
pub mod ranging;
pub mod shared;
pub mod stabilizer;
pub mod ultrasonic;
pub mod zone;

pub use config::ParkingConfig;
pub use control::{ControlLoop, ParkingController, TickOutput};
pub use occupancy::{OccupancySnapshot, SpotSnapshot, SpotStatus};
pub use shared::SharedStatus;

/// Microsecond-resolution instant used across the crate.
pub type Instant = fugit::TimerInstantU64<1_000_000>;
/// Microsecond-resolution duration used across the crate.
pub type Duration = fugit::MicrosDurationU64;

/// Number of monitored parking spots.
pub const SPOT_COUNT: usize = 2;

/// Distance substituted for any invalid or timed out reading.
pub const FAR_MM: u16 = 9999;

/// Monotonic clock source.
pub trait Now {
    fn now(&self) -> Instant;
}

impl<T: Now + ?Sized> Now for &T {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Time elapsed from `since` to `now`, zero if the clock appears to run backwards.
pub fn elapsed(now: Instant, since: Instant) -> Duration {
    now.checked_duration_since(since)
        .unwrap_or(Duration::from_ticks(0))
}

#[cfg(test)]
pub(crate) mod test_clock {
    use super::{Instant, Now};
    use core::cell::Cell;

    /// Fake clock that advances by a fixed step every time it is sampled.
    pub struct SteppingClock {
        ticks: Cell<u64>,
        step_us: u64,
    }

    impl SteppingClock {
        pub fn new(step_us: u64) -> Self {
            Self {
                ticks: Cell::new(0),
                step_us,
            }
        }
    }

    impl Now for SteppingClock {
        fn now(&self) -> Instant {
            let t = self.ticks.get();
            self.ticks.set(t + self.step_us);
            Instant::from_ticks(t)
        }
    }
}
