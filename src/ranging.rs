//! Register-level driver for the VL53L0X time-of-flight ranging sensor.
//!
//! Only the subset of the ST init sequence needed for continuous ranging is
//! implemented: stop-variable capture, tuning limits, SPAD calibration,
//! interrupt setup and a fixed timing budget. All bus traffic is blocking.

use core::fmt;

use embedded_hal::i2c::I2c;
use log::{debug, info, trace};

use crate::poll::{poll_until, PollError};
use crate::{Duration, Now};

/// Reading returned when the sensor did not produce a result in time.
pub const RANGE_TIMEOUT: u16 = 65535;

pub const DEFAULT_IO_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_TIMING_BUDGET_US: u32 = 33_000;

// 0.25 MCPS in Q9.7
const MIN_SIGNAL_RATE_LIMIT: u16 = 0x0020;
// Inter-measurement period approximation for the default budget
const DEFAULT_INTERMEASUREMENT: u16 = (DEFAULT_TIMING_BUDGET_US / 1085) as u16;

#[allow(dead_code)]
pub mod regs {
    pub const ADDR: u8 = 0x29; // default addr

    macro_rules! vl53regs {
        ($($name:ident : $val:literal),* $(,)?) => {
            $(
                pub const $name: u8 = $val;
            )*

            pub fn regname(reg: u8) -> &'static str {
                match reg {
                    $(
                        $val => stringify!($name),
                    )*
                    _ => "UNKNOWN",
                }
            }
        }
    }

    // Undocumented registers keep the names used by the ST API internals
    vl53regs! {
        SYSRANGE_START: 0x00,
        SYSTEM_SEQUENCE_CONFIG: 0x01,
        SYSTEM_INTERMEASUREMENT_PERIOD: 0x04,
        SYSTEM_INTERRUPT_CONFIG_GPIO: 0x0A,
        SYSTEM_INTERRUPT_CLEAR: 0x0B,
        RESULT_INTERRUPT_STATUS: 0x13,
        RESULT_RANGE_MM: 0x1E,
        FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT: 0x44,
        MSRC_CONFIG_CONTROL: 0x60,
        POWER_MANAGEMENT_GO1_POWER_FORCE: 0x80,
        SPAD_ENABLE: 0x81,
        SPAD_STATUS: 0x83,
        GPIO_HV_MUX_ACTIVE_HIGH: 0x84,
        STOP_VARIABLE: 0x91,
        SPAD_INFO: 0x92,
        SPAD_CONFIG: 0x94,
        PAGE_SELECT: 0xFF,
    }
}

use regs::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    I2c(E),
    /// A bounded wait during initialization never completed.
    Timeout,
}

impl<E> From<PollError<E>> for Error<E> {
    fn from(err: PollError<E>) -> Self {
        match err {
            PollError::Timeout => Error::Timeout,
            PollError::Io(e) => Error::I2c(e),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "i2c error: {e:?}"),
            Error::Timeout => write!(f, "sensor did not respond within the io timeout"),
        }
    }
}

/// VL53L0X ranging sensor on a blocking I2C bus.
pub struct Vl53l0x<I2C, C> {
    i2c: I2C,
    clock: C,
    address: u8,
    io_timeout: Duration,
    stop_variable: u8,
    measurement_timing_budget_us: u32,
}

impl<I2C, C, E> Vl53l0x<I2C, C>
where
    I2C: I2c<Error = E>,
    C: Now,
{
    /// Wraps the bus. The sensor is untouched until [`init`](Self::init).
    pub fn new(i2c: I2C, clock: C) -> Self {
        Self {
            i2c,
            clock,
            address: ADDR,
            io_timeout: Duration::millis(DEFAULT_IO_TIMEOUT_MS),
            stop_variable: 0,
            measurement_timing_budget_us: DEFAULT_TIMING_BUDGET_US,
        }
    }

    pub fn set_io_timeout(&mut self, timeout: Duration) {
        self.io_timeout = timeout;
    }

    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Calibration byte captured during init and replayed on every trigger.
    pub fn stop_variable(&self) -> u8 {
        self.stop_variable
    }

    pub fn measurement_timing_budget_us(&self) -> u32 {
        self.measurement_timing_budget_us
    }

    /// Gives the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Runs the full power-on configuration.
    ///
    /// # Errors
    ///
    /// * `Error::Timeout` if SPAD calibration does not finish within the io timeout
    /// * `Error::I2c` on any bus failure
    pub fn init(&mut self) -> Result<(), Error<E>> {
        // wake the sensor and capture the stop variable
        self.write_sequence(&[
            (POWER_MANAGEMENT_GO1_POWER_FORCE, 0x01),
            (PAGE_SELECT, 0x01),
            (SYSRANGE_START, 0x00),
        ])?;
        self.stop_variable = self.read_reg(STOP_VARIABLE)?;
        self.write_sequence(&[
            (SYSRANGE_START, 0x01),
            (PAGE_SELECT, 0x00),
            (POWER_MANAGEMENT_GO1_POWER_FORCE, 0x00),
        ])?;
        debug!("vl53l0x stop variable: {:#04x}", self.stop_variable);

        // disable SIGNAL_RATE_MSRC and SIGNAL_RATE_PRE_RANGE limit checks
        let msrc = self.read_reg(MSRC_CONFIG_CONTROL)?;
        self.write_reg(MSRC_CONFIG_CONTROL, msrc | 0x12)?;
        self.write_reg16(FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT, MIN_SIGNAL_RATE_LIMIT)?;
        self.write_reg(SYSTEM_SEQUENCE_CONFIG, 0xFF)?;

        self.calibrate_spads()?;

        // interrupt pin is unused but a pending flag would block new results
        self.write_reg(SYSTEM_INTERRUPT_CONFIG_GPIO, 0x04)?;
        let mux = self.read_reg(GPIO_HV_MUX_ACTIVE_HIGH)?;
        self.write_reg(GPIO_HV_MUX_ACTIVE_HIGH, mux & !0x10)?;
        self.write_reg(SYSTEM_INTERRUPT_CLEAR, 0x01)?;

        self.measurement_timing_budget_us = DEFAULT_TIMING_BUDGET_US;
        self.write_reg(SYSTEM_SEQUENCE_CONFIG, 0xE8)?;
        self.write_reg16(SYSTEM_INTERMEASUREMENT_PERIOD, DEFAULT_INTERMEASUREMENT)?;

        self.write_reg(SYSTEM_INTERRUPT_CLEAR, 0x01)?;
        info!(
            "vl53l0x initialized at {:#04x}, budget {} us",
            self.address, self.measurement_timing_budget_us
        );
        Ok(())
    }

    fn calibrate_spads(&mut self) -> Result<(), Error<E>> {
        self.write_sequence(&[
            (POWER_MANAGEMENT_GO1_POWER_FORCE, 0x01),
            (PAGE_SELECT, 0x01),
            (SYSRANGE_START, 0x00),
            (PAGE_SELECT, 0x06),
        ])?;
        let status = self.read_reg(SPAD_STATUS)?;
        self.write_reg(SPAD_STATUS, status | 0x04)?;
        self.write_sequence(&[
            (PAGE_SELECT, 0x07),
            (SPAD_ENABLE, 0x01),
            (POWER_MANAGEMENT_GO1_POWER_FORCE, 0x01),
            (SPAD_CONFIG, 0x6b),
            (SPAD_STATUS, 0x00),
        ])?;

        let (i2c, address) = (&mut self.i2c, self.address);
        poll_until(&self.clock, self.io_timeout, || {
            read_reg(i2c, address, SPAD_STATUS).map(|v| v != 0x00)
        })?;

        self.write_reg(SPAD_STATUS, 0x01)?;
        // the SPAD info byte must be read out, its value is not needed here
        let _ = self.read_reg(SPAD_INFO)?;
        self.write_sequence(&[(SPAD_ENABLE, 0x00), (PAGE_SELECT, 0x06)])?;
        let status = self.read_reg(SPAD_STATUS)?;
        self.write_reg(SPAD_STATUS, status & !0x04)?;
        self.write_sequence(&[
            (PAGE_SELECT, 0x01),
            (SYSRANGE_START, 0x01),
            (PAGE_SELECT, 0x00),
            (POWER_MANAGEMENT_GO1_POWER_FORCE, 0x00),
        ])?;
        debug!("vl53l0x SPAD calibration done");
        Ok(())
    }

    /// Arms continuous ranging.
    ///
    /// `period_ms == 0` runs back-to-back, anything else runs timed ranging at
    /// that period.
    pub fn start_continuous(&mut self, period_ms: u32) -> Result<(), Error<E>> {
        self.replay_stop_variable()?;

        if period_ms != 0 {
            let period = (period_ms.saturating_mul(12) / 13).min(u16::MAX as u32) as u16;
            self.write_reg16(SYSTEM_INTERMEASUREMENT_PERIOD, period)?;
            self.write_reg(SYSRANGE_START, 0x04)?;
            info!("vl53l0x timed continuous ranging every {period_ms} ms");
        } else {
            self.write_reg(SYSRANGE_START, 0x02)?;
            info!("vl53l0x back-to-back continuous ranging");
        }
        Ok(())
    }

    /// Waits for the next continuous result.
    ///
    /// Blocks for at most the io timeout and returns [`RANGE_TIMEOUT`] if no
    /// result arrived. Only bus failures are reported as errors.
    pub fn read_continuous_mm(&mut self) -> Result<u16, Error<E>> {
        match self.wait_data_ready() {
            Ok(()) => {}
            Err(PollError::Timeout) => return Ok(RANGE_TIMEOUT),
            Err(PollError::Io(e)) => return Err(Error::I2c(e)),
        }
        self.read_range()
    }

    /// Triggers and waits for one measurement outside continuous mode.
    pub fn read_single_mm(&mut self) -> Result<u16, Error<E>> {
        self.replay_stop_variable()?;
        self.write_reg(SYSRANGE_START, 0x01)?;

        let (i2c, address) = (&mut self.i2c, self.address);
        match poll_until(&self.clock, self.io_timeout, || {
            read_reg(i2c, address, SYSRANGE_START).map(|v| v & 0x01 == 0)
        }) {
            Ok(()) => {}
            Err(PollError::Timeout) => return Ok(RANGE_TIMEOUT),
            Err(PollError::Io(e)) => return Err(Error::I2c(e)),
        }

        match self.wait_data_ready() {
            Ok(()) => {}
            Err(PollError::Timeout) => return Ok(RANGE_TIMEOUT),
            Err(PollError::Io(e)) => return Err(Error::I2c(e)),
        }
        self.read_range()
    }

    fn replay_stop_variable(&mut self) -> Result<(), Error<E>> {
        let stop = self.stop_variable;
        self.write_sequence(&[
            (POWER_MANAGEMENT_GO1_POWER_FORCE, 0x01),
            (PAGE_SELECT, 0x01),
            (SYSRANGE_START, 0x00),
            (STOP_VARIABLE, stop),
            (SYSRANGE_START, 0x01),
            (PAGE_SELECT, 0x00),
            (POWER_MANAGEMENT_GO1_POWER_FORCE, 0x00),
        ])
    }

    fn wait_data_ready(&mut self) -> Result<(), PollError<E>> {
        let (i2c, address) = (&mut self.i2c, self.address);
        poll_until(&self.clock, self.io_timeout, || {
            read_reg(i2c, address, RESULT_INTERRUPT_STATUS).map(|v| v & 0x07 != 0)
        })
    }

    fn read_range(&mut self) -> Result<u16, Error<E>> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[RESULT_RANGE_MM], &mut buf)
            .map_err(Error::I2c)?;
        let range = u16::from_be_bytes(buf);
        self.write_reg(SYSTEM_INTERRUPT_CLEAR, 0x01)?;
        trace!("vl53l0x range {range} mm");
        Ok(range)
    }

    fn write_sequence(&mut self, writes: &[(u8, u8)]) -> Result<(), Error<E>> {
        for &(reg, val) in writes {
            self.write_reg(reg, val)?;
        }
        Ok(())
    }

    fn write_reg(&mut self, reg: u8, val: u8) -> Result<(), Error<E>> {
        trace!("vl53l0x write {} <- {:#04x}", regname(reg), val);
        self.i2c.write(self.address, &[reg, val]).map_err(Error::I2c)
    }

    fn write_reg16(&mut self, reg: u8, val: u16) -> Result<(), Error<E>> {
        trace!("vl53l0x write16 {} <- {:#06x}", regname(reg), val);
        let [hi, lo] = val.to_be_bytes();
        self.i2c.write(self.address, &[reg, hi, lo]).map_err(Error::I2c)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Error<E>> {
        read_reg(&mut self.i2c, self.address, reg).map_err(Error::I2c)
    }
}

fn read_reg<I2C: I2c>(i2c: &mut I2C, address: u8, reg: u8) -> Result<u8, I2C::Error> {
    let mut buf = [0u8; 1];
    i2c.write_read(address, &[reg], &mut buf)?;
    Ok(buf[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_clock::SteppingClock;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    fn w(reg: u8, val: u8) -> Transaction {
        Transaction::write(ADDR, vec![reg, val])
    }

    fn w16(reg: u8, val: u16) -> Transaction {
        Transaction::write(ADDR, vec![reg, (val >> 8) as u8, val as u8])
    }

    fn r(reg: u8, val: u8) -> Transaction {
        Transaction::write_read(ADDR, vec![reg], vec![val])
    }

    fn stop_variable_replay(stop: u8) -> Vec<Transaction> {
        vec![
            w(0x80, 0x01),
            w(0xFF, 0x01),
            w(0x00, 0x00),
            w(0x91, stop),
            w(0x00, 0x01),
            w(0xFF, 0x00),
            w(0x80, 0x00),
        ]
    }

    fn init_until_spad_poll() -> Vec<Transaction> {
        vec![
            w(0x80, 0x01),
            w(0xFF, 0x01),
            w(0x00, 0x00),
            r(0x91, 0x3C),
            w(0x00, 0x01),
            w(0xFF, 0x00),
            w(0x80, 0x00),
            r(0x60, 0x00),
            w(0x60, 0x12),
            w16(0x44, 0x0020),
            w(0x01, 0xFF),
            w(0x80, 0x01),
            w(0xFF, 0x01),
            w(0x00, 0x00),
            w(0xFF, 0x06),
            r(0x83, 0x01),
            w(0x83, 0x05),
            w(0xFF, 0x07),
            w(0x81, 0x01),
            w(0x80, 0x01),
            w(0x94, 0x6b),
            w(0x83, 0x00),
        ]
    }

    #[test]
    fn init_runs_full_sequence_and_captures_stop_variable() {
        let mut expected = init_until_spad_poll();
        expected.extend([
            r(0x83, 0x00),
            r(0x83, 0x10),
            w(0x83, 0x01),
            r(0x92, 0xAA),
            w(0x81, 0x00),
            w(0xFF, 0x06),
            r(0x83, 0x05),
            w(0x83, 0x01),
            w(0xFF, 0x01),
            w(0x00, 0x01),
            w(0xFF, 0x00),
            w(0x80, 0x00),
            w(0x0A, 0x04),
            r(0x84, 0x11),
            w(0x84, 0x01),
            w(0x0B, 0x01),
            w(0x01, 0xE8),
            w16(0x04, 30),
            w(0x0B, 0x01),
        ]);

        let i2c = I2cMock::new(&expected);
        let mut sensor = Vl53l0x::new(i2c, SteppingClock::new(1_000));
        sensor.init().unwrap();

        assert_eq!(sensor.stop_variable(), 0x3C);
        assert_eq!(sensor.measurement_timing_budget_us(), 33_000);
        sensor.release().done();
    }

    #[test]
    fn bus_error_during_spad_calibration_aborts_init() {
        let mut expected = init_until_spad_poll();
        expected.push(r(0x83, 0x00).with_error(ErrorKind::Other));

        let mut sensor = Vl53l0x::new(I2cMock::new(&expected), SteppingClock::new(1_000));
        assert_eq!(sensor.init(), Err(Error::I2c(ErrorKind::Other)));
        sensor.release().done();
    }

    #[test]
    fn init_fails_when_spad_calibration_never_completes() {
        let mut expected = init_until_spad_poll();
        // clock samples 0, 600, 1200 ms around two status reads
        expected.extend([r(0x83, 0x00), r(0x83, 0x00)]);

        let i2c = I2cMock::new(&expected);
        let mut sensor = Vl53l0x::new(i2c, SteppingClock::new(600_000));
        assert_eq!(sensor.init(), Err(Error::Timeout));
        sensor.release().done();
    }

    #[test]
    fn start_continuous_back_to_back() {
        let mut expected = stop_variable_replay(0x00);
        expected.push(w(0x00, 0x02));

        let mut sensor = Vl53l0x::new(I2cMock::new(&expected), SteppingClock::new(1));
        sensor.start_continuous(0).unwrap();
        sensor.release().done();
    }

    #[test]
    fn start_continuous_timed_scales_period() {
        let mut expected = stop_variable_replay(0x00);
        // 100 ms * 12 / 13
        expected.extend([w16(0x04, 92), w(0x00, 0x04)]);

        let mut sensor = Vl53l0x::new(I2cMock::new(&expected), SteppingClock::new(1));
        sensor.start_continuous(100).unwrap();
        sensor.release().done();
    }

    #[test]
    fn read_continuous_returns_range_and_clears_interrupt() {
        let expected = [
            r(0x13, 0x00),
            r(0x13, 0x04),
            Transaction::write_read(ADDR, vec![0x1E], vec![0x01, 0x2C]),
            w(0x0B, 0x01),
        ];

        let mut sensor = Vl53l0x::new(I2cMock::new(&expected), SteppingClock::new(1_000));
        assert_eq!(sensor.read_continuous_mm(), Ok(300));
        sensor.release().done();
    }

    #[test]
    fn read_continuous_timeout_is_sentinel_not_error() {
        let expected = [r(0x13, 0x00), r(0x13, 0x00)];

        let mut sensor = Vl53l0x::new(I2cMock::new(&expected), SteppingClock::new(600_000));
        assert_eq!(sensor.read_continuous_mm(), Ok(RANGE_TIMEOUT));
        sensor.release().done();
    }

    #[test]
    fn read_single_replays_stop_variable_before_triggering() {
        let mut expected = stop_variable_replay(0x00);
        expected.extend([
            w(0x00, 0x01),
            r(0x00, 0x01),
            r(0x00, 0x00),
            r(0x13, 0x07),
            Transaction::write_read(ADDR, vec![0x1E], vec![0x00, 0x78]),
            w(0x0B, 0x01),
        ]);

        let mut sensor = Vl53l0x::new(I2cMock::new(&expected), SteppingClock::new(1_000));
        assert_eq!(sensor.read_single_mm(), Ok(120));
        sensor.release().done();
    }

    #[test]
    fn shorter_io_timeout_bounds_the_wait() {
        // 50 ms timeout with 30 ms clock steps: samples 0, 30, 60
        let expected = [r(0x13, 0x00), r(0x13, 0x00)];

        let mut sensor = Vl53l0x::new(I2cMock::new(&expected), SteppingClock::new(30_000));
        sensor.set_io_timeout(Duration::millis(50));
        assert_eq!(sensor.io_timeout(), Duration::millis(50));
        assert_eq!(sensor.read_continuous_mm(), Ok(RANGE_TIMEOUT));
        sensor.release().done();
    }

    #[test]
    fn register_names_resolve_for_tracing() {
        assert_eq!(regname(RESULT_RANGE_MM), "RESULT_RANGE_MM");
        assert_eq!(regname(0x42), "UNKNOWN");
    }
}
