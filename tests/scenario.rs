use parking_gate_rs::control::{Actuators, DisplayFrame, EchoSensor, RangeSensor, StatusDisplay};
use parking_gate_rs::gate::{GateCommand, GatePosition};
use parking_gate_rs::ranging::RANGE_TIMEOUT;
use parking_gate_rs::ultrasonic::NO_ECHO_CM;
use parking_gate_rs::{http, ControlLoop, Instant, ParkingConfig, ParkingController, SharedStatus};

fn at(ms: u64) -> Instant {
    Instant::from_ticks(ms * 1000)
}

#[test]
fn car_parks_in_spot_one() {
    let mut ctl = ParkingController::new(ParkingConfig::default());
    let readings: [u16; 9] = [700, 700, 500, 300, 120, 120, 120, 120, 500];

    let mut gate = Vec::new();
    let mut durations = Vec::new();
    for (i, mm) in readings.into_iter().enumerate() {
        let out = ctl.tick(at(i as u64 * 100), mm, NO_ECHO_CM, [false; 2]);
        gate.push(out.gate.map(|c| c.position));
        durations.push(ctl.occupancy().spot(0).occupied_duration_ms);
        assert!(!ctl.occupancy().spot(1).occupied);
    }

    use GatePosition::*;
    assert_eq!(
        gate,
        [None, None, Some(Lowered), None, None, None, Some(Raised), None, Some(Lowered)]
    );
    assert_eq!(durations, [0, 0, 0, 0, 100, 200, 300, 400, 0]);
}

#[test]
fn timeouts_never_move_the_gate() {
    let mut ctl = ParkingController::new(ParkingConfig::default());
    for i in 0..20 {
        let out = ctl.tick(at(i * 100), RANGE_TIMEOUT, NO_ECHO_CM, [true, true]);
        assert_eq!(out.gate, None);
        assert!(!out.maneuver_tone);
        assert_eq!(out.locate_tone, None);
    }
    assert_eq!(ctl.gate().position(), GatePosition::Raised);
    assert!(ctl.locate().active().is_none());
}

struct Fixed(u16, f32);

impl RangeSensor for Fixed {
    fn read_mm(&mut self) -> u16 {
        self.0
    }
}

impl EchoSensor for Fixed {
    fn read_cm(&mut self) -> f32 {
        self.1
    }
}

#[derive(Default)]
struct Quiet {
    locate_on: usize,
}

impl Actuators for Quiet {
    fn apply_gate(&mut self, _command: &GateCommand) {}

    fn set_maneuver_tone(&mut self, _on: bool) {}

    fn set_locate_tone(&mut self, on: bool) {
        if on {
            self.locate_on += 1;
        }
    }
}

struct NoScreen;

impl StatusDisplay for NoScreen {
    fn show(&mut self, _frame: &DisplayFrame) {}
}

#[test]
fn status_and_locate_over_http() {
    let shared = SharedStatus::new();
    let mut ctl = ControlLoop::new(
        Fixed(100, NO_ECHO_CM),
        Fixed(0, 11.0),
        Quiet::default(),
        NoScreen,
        &shared,
        ParkingConfig::default(),
    );
    ctl.start();

    // 1.1 s of polling at the firmware's 5 ms yield
    for ms in (0..1100).step_by(5) {
        ctl.poll(at(ms));
    }

    let reply = http::respond(b"GET /status HTTP/1.1\r\n\r\n", &shared).unwrap();
    assert!(reply.ends_with(
        r#"{"spot1":{"occupied":true,"seconds":1},"spot2":{"occupied":true,"seconds":0}}"#
    ));

    http::respond(b"GET /locate1 HTTP/1.1\r\n\r\n", &shared).unwrap();
    for ms in (1100..2600).step_by(5) {
        ctl.poll(at(ms));
    }
    assert_eq!(ctl.actuators().locate_on, 3);
    assert!(ctl.controller().locate().active().is_none());
}
