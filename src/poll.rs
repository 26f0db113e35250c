//! Bounded busy-wait shared by both sensor drivers.

use core::fmt;

use crate::{elapsed, Duration, Now};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollError<E> {
    /// The condition did not become true within the allowed time.
    Timeout,
    /// The underlying bus or pin failed while being sampled.
    Io(E),
}

impl<E: fmt::Debug> fmt::Display for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Timeout => write!(f, "timed out waiting for condition"),
            PollError::Io(e) => write!(f, "io error while polling: {e:?}"),
        }
    }
}

/// Spins on `ready` until it reports `true`.
///
/// `ready` is always sampled at least once. The wait fails with
/// [`PollError::Timeout`] once strictly more than `timeout` has passed since
/// the first clock sample.
pub fn poll_until<C, E, F>(clock: &C, timeout: Duration, mut ready: F) -> Result<(), PollError<E>>
where
    C: Now + ?Sized,
    F: FnMut() -> Result<bool, E>,
{
    let start = clock.now();
    loop {
        if ready().map_err(PollError::Io)? {
            return Ok(());
        }
        if elapsed(clock.now(), start) > timeout {
            return Err(PollError::Timeout);
        }
    }
}
