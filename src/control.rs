//! Per-tick parking logic and the cooperative loop that drives it.
//!
//! [`ParkingController`] is pure: raw readings and locate requests in,
//! actuator commands out. [`ControlLoop`] owns the hardware, runs the sensor
//! stage every `sensor_interval` and the display stage every
//! `display_interval`, and publishes the occupancy snapshot.

use core::fmt::{Debug, Write};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;
use embedded_hal::pwm::SetDutyCycle;
use heapless::String;
use log::{debug, warn};

use crate::buzzer::ManeuverBuzzerController;
use crate::config::ParkingConfig;
use crate::gate::{GateCommand, GateController, StatusLeds};
use crate::locate::{LocateAction, LocateSequencer};
use crate::occupancy::{OccupancySnapshot, OccupancyTracker};
use crate::ranging::{Vl53l0x, RANGE_TIMEOUT};
use crate::shared::SharedStatus;
use crate::stabilizer::{normalize_ranging_mm, normalize_ultrasonic_cm, DistanceStabilizer};
use crate::ultrasonic::{Hcsr04, NO_ECHO_CM};
use crate::zone::SpotLabel;
use crate::{elapsed, Duration, Instant, Now, FAR_MM, SPOT_COUNT};

/// Servo frame length.
pub const SERVO_PERIOD_US: u16 = 20_000;
/// Pulse width at 0 degrees.
pub const SERVO_MIN_PULSE_US: u16 = 500;
/// Pulse width at 180 degrees.
pub const SERVO_MAX_PULSE_US: u16 = 2_400;

/// Duty used while a buzzer tone is on.
const TONE_DUTY_PERCENT: u8 = 50;

pub const DISPLAY_LINE_LEN: usize = 24;

/// One text line per spot, e.g. `Spot 1: 120mm OCCUPIED`.
pub type DisplayFrame = [String<DISPLAY_LINE_LEN>; SPOT_COUNT];

/// Distance source for spot 1. Always yields a reading; failures become the
/// 65535 timeout sentinel.
pub trait RangeSensor {
    fn read_mm(&mut self) -> u16;
}

/// Distance source for spot 2. Always yields a reading; failures become the
/// no-echo sentinel.
pub trait EchoSensor {
    fn read_cm(&mut self) -> f32;
}

/// Everything the loop switches on and off.
pub trait Actuators {
    fn apply_gate(&mut self, command: &GateCommand);
    fn set_maneuver_tone(&mut self, on: bool);
    fn set_locate_tone(&mut self, on: bool);
}

/// Text renderer for the two-line status screen.
pub trait StatusDisplay {
    fn show(&mut self, frame: &DisplayFrame);
}

impl<T: RangeSensor + ?Sized> RangeSensor for &mut T {
    fn read_mm(&mut self) -> u16 {
        (**self).read_mm()
    }
}

impl<T: EchoSensor + ?Sized> EchoSensor for &mut T {
    fn read_cm(&mut self) -> f32 {
        (**self).read_cm()
    }
}

impl<I2C, C, E> RangeSensor for Vl53l0x<I2C, C>
where
    I2C: I2c<Error = E>,
    C: Now,
    E: Debug,
{
    fn read_mm(&mut self) -> u16 {
        match self.read_continuous_mm() {
            Ok(mm) => mm,
            Err(err) => {
                warn!("ranging read failed: {err}");
                RANGE_TIMEOUT
            }
        }
    }
}

impl<TRIG, ECHO, D, C, E> EchoSensor for Hcsr04<TRIG, ECHO, D, C>
where
    TRIG: OutputPin<Error = E>,
    ECHO: InputPin<Error = E>,
    D: DelayNs,
    C: Now,
    E: Debug,
{
    fn read_cm(&mut self) -> f32 {
        match self.measure_cm() {
            Ok(cm) => cm,
            Err(err) => {
                warn!("ultrasonic pin error: {err:?}");
                NO_ECHO_CM
            }
        }
    }
}

/// Pulse width for a servo angle, clamped to 0..=180 degrees.
pub fn servo_pulse_us(angle: u8) -> u16 {
    let angle = angle.min(180) as u32;
    let span = (SERVO_MAX_PULSE_US - SERVO_MIN_PULSE_US) as u32;
    SERVO_MIN_PULSE_US + (angle * span / 180) as u16
}

/// PWM and GPIO backed actuators.
pub struct PwmActuators<S, G, R, M, L> {
    servo: S,
    green: G,
    red: R,
    maneuver: M,
    locate: L,
    maneuver_on: bool,
    locate_on: bool,
}

impl<S, G, R, M, L> PwmActuators<S, G, R, M, L>
where
    S: SetDutyCycle,
    G: OutputPin,
    R: OutputPin,
    M: SetDutyCycle,
    L: SetDutyCycle,
{
    pub fn new(servo: S, green: G, red: R, maneuver: M, locate: L) -> Self {
        Self {
            servo,
            green,
            red,
            maneuver,
            locate,
            maneuver_on: false,
            locate_on: false,
        }
    }

    /// Moves the servo without touching the LEDs. Used by the boot self test.
    pub fn set_servo_angle(&mut self, angle: u8) {
        if let Err(err) = self
            .servo
            .set_duty_cycle_fraction(servo_pulse_us(angle), SERVO_PERIOD_US)
        {
            warn!("servo write failed: {err:?}");
        }
    }

    pub fn set_leds(&mut self, leds: StatusLeds) {
        if self.green.set_state(leds.green.into()).is_err() {
            warn!("green led write failed");
        }
        if self.red.set_state(leds.red.into()).is_err() {
            warn!("red led write failed");
        }
    }

    pub fn release(self) -> (S, G, R, M, L) {
        (self.servo, self.green, self.red, self.maneuver, self.locate)
    }
}

fn set_tone<P: SetDutyCycle>(pwm: &mut P, on: bool) {
    let res = if on {
        pwm.set_duty_cycle_percent(TONE_DUTY_PERCENT)
    } else {
        pwm.set_duty_cycle_fully_off()
    };
    if let Err(err) = res {
        warn!("buzzer write failed: {err:?}");
    }
}

impl<S, G, R, M, L> Actuators for PwmActuators<S, G, R, M, L>
where
    S: SetDutyCycle,
    G: OutputPin,
    R: OutputPin,
    M: SetDutyCycle,
    L: SetDutyCycle,
{
    fn apply_gate(&mut self, command: &GateCommand) {
        self.set_servo_angle(command.servo_angle);
        self.set_leds(command.leds);
    }

    fn set_maneuver_tone(&mut self, on: bool) {
        if on != self.maneuver_on {
            self.maneuver_on = on;
            set_tone(&mut self.maneuver, on);
        }
    }

    fn set_locate_tone(&mut self, on: bool) {
        if on != self.locate_on {
            self.locate_on = on;
            set_tone(&mut self.locate, on);
        }
    }
}

/// Result of one sensor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutput {
    /// Normalized distances, ranging channel then stabilized ultrasonic.
    pub distances_mm: [u16; SPOT_COUNT],
    /// Set only on a gate transition.
    pub gate: Option<GateCommand>,
    pub maneuver_tone: bool,
    /// Set only when the locate pattern toggles or ends.
    pub locate_tone: Option<bool>,
    pub snapshot: OccupancySnapshot,
}

#[derive(Debug, Clone)]
pub struct ParkingController {
    config: ParkingConfig,
    ultrasonic: DistanceStabilizer,
    occupancy: OccupancyTracker,
    gate: GateController,
    maneuver: ManeuverBuzzerController,
    locate: LocateSequencer,
}

impl ParkingController {
    pub fn new(config: ParkingConfig) -> Self {
        Self {
            config,
            ultrasonic: DistanceStabilizer::default(),
            occupancy: OccupancyTracker::new(config.occupied_threshold_mm),
            gate: GateController::new(config.gate_settle),
            maneuver: ManeuverBuzzerController::new(),
            locate: LocateSequencer::new(config.locate_half_period),
        }
    }

    pub fn config(&self) -> &ParkingConfig {
        &self.config
    }

    pub fn gate(&self) -> &GateController {
        &self.gate
    }

    pub fn occupancy(&self) -> &OccupancyTracker {
        &self.occupancy
    }

    pub fn locate(&self) -> &LocateSequencer {
        &self.locate
    }

    /// Runs one sensor tick.
    ///
    /// `raw_range_mm` may be the 65535 timeout sentinel and `raw_echo_cm` may
    /// be negative; both end up as far readings.
    pub fn tick(
        &mut self,
        now: Instant,
        raw_range_mm: u16,
        raw_echo_cm: f32,
        locate_requests: [bool; SPOT_COUNT],
    ) -> TickOutput {
        let distances_mm = [
            normalize_ranging_mm(raw_range_mm),
            self.ultrasonic.update(normalize_ultrasonic_cm(raw_echo_cm)),
        ];
        debug!("tick raw {raw_range_mm} mm / {raw_echo_cm} cm -> {distances_mm:?}");

        self.occupancy.update(distances_mm, self.config.tick_ms());

        self.locate
            .handle_requests(locate_requests, self.occupancy.occupied());
        let locate_action = self.locate.tick(now);

        let gate = self.gate.update(distances_mm, &self.config, now);

        let mut maneuver_tone = self.maneuver.update(distances_mm, &self.config, now);
        let locate_tone = match locate_action {
            Some(LocateAction::ToneOn) => Some(true),
            Some(LocateAction::ToneOff) => {
                self.maneuver.silence();
                maneuver_tone = false;
                Some(false)
            }
            Some(LocateAction::Finished) => {
                self.maneuver.reset();
                maneuver_tone = false;
                Some(false)
            }
            None => None,
        };

        TickOutput {
            distances_mm,
            gate,
            maneuver_tone,
            locate_tone,
            snapshot: self.occupancy.snapshot(),
        }
    }
}

/// Builds the status screen text for the given normalized distances.
pub fn display_frame(distances_mm: [u16; SPOT_COUNT], config: &ParkingConfig) -> DisplayFrame {
    let mut frame = DisplayFrame::default();
    for (idx, (line, distance)) in frame.iter_mut().zip(distances_mm).enumerate() {
        let label = SpotLabel::classify(distance, config).as_str();
        // four digits and the longest label fill DISPLAY_LINE_LEN exactly
        let _ = if distance >= FAR_MM {
            write!(line, "Spot {}: ---- {}", idx + 1, label)
        } else {
            write!(line, "Spot {}: {}mm {}", idx + 1, distance, label)
        };
    }
    frame
}

fn due(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    last.map_or(true, |last| elapsed(now, last) >= interval)
}

/// Software-timed scheduler around [`ParkingController`].
pub struct ControlLoop<'a, R, U, A, D> {
    range: R,
    echo: U,
    actuators: A,
    display: D,
    shared: &'a SharedStatus,
    controller: ParkingController,
    distances_mm: [u16; SPOT_COUNT],
    last_sensor: Option<Instant>,
    last_display: Option<Instant>,
}

impl<'a, R, U, A, D> ControlLoop<'a, R, U, A, D>
where
    R: RangeSensor,
    U: EchoSensor,
    A: Actuators,
    D: StatusDisplay,
{
    pub fn new(
        range: R,
        echo: U,
        actuators: A,
        display: D,
        shared: &'a SharedStatus,
        config: ParkingConfig,
    ) -> Self {
        Self {
            range,
            echo,
            actuators,
            display,
            shared,
            controller: ParkingController::new(config),
            distances_mm: [FAR_MM; SPOT_COUNT],
            last_sensor: None,
            last_display: None,
        }
    }

    /// Puts the actuators in their rest state before the first tick.
    pub fn start(&mut self) {
        let command = self.controller.gate().current_command();
        self.actuators.apply_gate(&command);
        self.actuators.set_maneuver_tone(false);
        self.actuators.set_locate_tone(false);
        self.shared.publish(self.controller.occupancy().snapshot());
    }

    /// One pass of the loop. Stages whose interval has not elapsed are skipped.
    pub fn poll(&mut self, now: Instant) {
        let config = *self.controller.config();

        if due(self.last_sensor, now, config.sensor_interval) {
            self.last_sensor = Some(now);
            self.sensor_stage(now);
        }

        if due(self.last_display, now, config.display_interval) {
            self.last_display = Some(now);
            let frame = display_frame(self.distances_mm, &config);
            self.display.show(&frame);
        }
    }

    fn sensor_stage(&mut self, now: Instant) {
        let raw_range_mm = self.range.read_mm();
        let raw_echo_cm = self.echo.read_cm();
        let requests = self.shared.take_locate_requests();

        let out = self
            .controller
            .tick(now, raw_range_mm, raw_echo_cm, requests);

        if let Some(command) = out.gate {
            self.actuators.apply_gate(&command);
        }
        self.actuators.set_maneuver_tone(out.maneuver_tone);
        if let Some(on) = out.locate_tone {
            self.actuators.set_locate_tone(on);
        }

        self.distances_mm = out.distances_mm;
        self.shared.publish(out.snapshot);
    }

    pub fn controller(&self) -> &ParkingController {
        &self.controller
    }

    pub fn distances_mm(&self) -> [u16; SPOT_COUNT] {
        self.distances_mm
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn display(&self) -> &D {
        &self.display
    }
}
