//! HC-SR04 style ultrasonic echo timing.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::trace;

use crate::poll::{poll_until, PollError};
use crate::{elapsed, Duration, Now};

/// Returned when no echo edge was seen within [`ECHO_TIMEOUT`].
pub const NO_ECHO_CM: f32 = -1.0;

/// Speed of sound, cm per microsecond.
pub const SOUND_SPEED_CM_US: f32 = 0.034;

/// Bound on each echo edge wait, roughly 5 m of range.
pub const ECHO_TIMEOUT: Duration = Duration::micros(30_000);

const SETTLE_MS: u32 = 50;

/// Trigger/echo pin pair driving an ultrasonic ranger.
pub struct Hcsr04<TRIG, ECHO, D, C> {
    trigger: TRIG,
    echo: ECHO,
    delay: D,
    clock: C,
}

impl<TRIG, ECHO, D, C, E> Hcsr04<TRIG, ECHO, D, C>
where
    TRIG: OutputPin<Error = E>,
    ECHO: InputPin<Error = E>,
    D: DelayNs,
    C: Now,
{
    pub fn new(trigger: TRIG, echo: ECHO, delay: D, clock: C) -> Self {
        Self {
            trigger,
            echo,
            delay,
            clock,
        }
    }

    /// Parks the trigger low and lets the module settle.
    pub fn init(&mut self) -> Result<(), E> {
        self.trigger.set_low()?;
        self.delay.delay_ms(SETTLE_MS);
        Ok(())
    }

    /// Fires one ping and times the echo.
    ///
    /// Returns the distance in centimeters, or [`NO_ECHO_CM`] if either echo
    /// edge timed out. Only pin failures are errors.
    pub fn measure_cm(&mut self) -> Result<f32, E> {
        self.trigger.set_low()?;
        self.delay.delay_us(2);
        self.trigger.set_high()?;
        self.delay.delay_us(10);
        self.trigger.set_low()?;

        let echo = &mut self.echo;
        match poll_until(&self.clock, ECHO_TIMEOUT, || echo.is_high()) {
            Ok(()) => {}
            Err(PollError::Timeout) => {
                trace!("echo never rose");
                return Ok(NO_ECHO_CM);
            }
            Err(PollError::Io(e)) => return Err(e),
        }
        let rise = self.clock.now();

        let echo = &mut self.echo;
        match poll_until(&self.clock, ECHO_TIMEOUT, || echo.is_low()) {
            Ok(()) => {}
            Err(PollError::Timeout) => {
                trace!("echo never fell");
                return Ok(NO_ECHO_CM);
            }
            Err(PollError::Io(e)) => return Err(e),
        }
        let fall = self.clock.now();

        let pulse_us = elapsed(fall, rise).to_micros();
        Ok(pulse_us as f32 * SOUND_SPEED_CM_US / 2.0)
    }

    pub fn release(self) -> (TRIG, ECHO) {
        (self.trigger, self.echo)
    }
}
